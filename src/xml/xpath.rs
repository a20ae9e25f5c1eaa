//! Location paths over an `xmltree` document.
//!
//! Only the subset needed to address envelope parts: child (`/`) and
//! descendant (`//`) steps with namespace-qualified name tests.

use std::collections::HashMap;
use std::ptr;
use xmltree::Element;

use crate::error::SoapError;
use crate::xml::child_elements;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone)]
pub(crate) struct Step {
    axis: Axis,
    /// `None` matches any namespace (`*`)
    namespace: Option<Option<String>>,
    /// `None` matches any local name
    local_name: Option<String>,
}

impl Step {
    fn matches(&self, el: &Element) -> bool {
        let name_ok = self.local_name.as_deref().map_or(true, |n| n == el.name);
        let ns_ok = match &self.namespace {
            None => true,
            Some(expected) => expected.as_deref() == el.namespace.as_deref().filter(|ns| !ns.is_empty()),
        };
        name_ok && ns_ok
    }
}

/// Parse `expr` into steps, resolving prefixes through `namespaces`.
pub(crate) fn compile(
    expr: &str,
    namespaces: &HashMap<String, String>,
) -> Result<Vec<Step>, SoapError> {
    let mut rest = expr.trim();
    if rest.is_empty() {
        return Err(SoapError::InvalidPath("empty expression".to_string()));
    }

    let mut steps = Vec::new();
    while !rest.is_empty() {
        let axis = if let Some(r) = rest.strip_prefix("//") {
            rest = r;
            Axis::Descendant
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
            Axis::Child
        } else if steps.is_empty() {
            Axis::Child
        } else {
            return Err(SoapError::InvalidPath(expr.to_string()));
        };

        let end = rest.find('/').unwrap_or(rest.len());
        let (test, remaining) = rest.split_at(end);
        rest = remaining;
        steps.push(name_test(axis, test, expr, namespaces)?);
    }

    Ok(steps)
}

fn name_test(
    axis: Axis,
    test: &str,
    expr: &str,
    namespaces: &HashMap<String, String>,
) -> Result<Step, SoapError> {
    let valid = |s: &str| {
        !s.is_empty()
            && (s == "*"
                || s
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
    };

    let (namespace, local) = match test.split_once(':') {
        Some((prefix, local)) => {
            if !valid(prefix) || prefix == "*" {
                return Err(SoapError::InvalidPath(expr.to_string()));
            }
            let uri = namespaces
                .get(prefix)
                .ok_or_else(|| SoapError::UnboundPrefix(prefix.to_string()))?;
            (Some(Some(uri.clone())), local)
        }
        None if test == "*" => (None, test),
        None => (Some(None), test),
    };

    if !valid(local) {
        return Err(SoapError::InvalidPath(expr.to_string()));
    }

    Ok(Step {
        axis,
        namespace,
        local_name: (local != "*").then(|| local.to_string()),
    })
}

/// Evaluate compiled steps against the document whose root is `root`.
pub(crate) fn select<'a>(root: &'a Element, steps: &[Step]) -> Vec<&'a Element> {
    let mut current: Vec<&'a Element> = Vec::new();

    for (i, step) in steps.iter().enumerate() {
        let mut candidates = Vec::new();
        if i == 0 {
            // The context is the document node, whose only child is the root.
            candidates.push(root);
            if step.axis == Axis::Descendant {
                descendants(root, &mut candidates);
            }
        } else {
            for ctx in current.iter().copied() {
                match step.axis {
                    Axis::Child => candidates.extend(child_elements(ctx)),
                    Axis::Descendant => descendants(ctx, &mut candidates),
                }
            }
        }

        let mut next: Vec<&'a Element> = Vec::new();
        for el in candidates {
            if step.matches(el) && !next.iter().any(|seen| ptr::eq(*seen, el)) {
                next.push(el);
            }
        }
        current = next;
    }

    current
}

fn descendants<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    for child in child_elements(el) {
        out.push(child);
        descendants(child, out);
    }
}
