//! Strip empty elements from the envelope before sending.

use async_trait::async_trait;
use tracing::debug;
use xmltree::{Element, XMLNode};

use crate::error::SoapError;
use crate::message::{CallOptions, SoapRequest, SoapResponse};
use crate::middleware::{Middleware, Next};
use crate::xml::SoapXmlView;

/// Removes every element below `Header` and `Body` that has no child nodes.
///
/// Whitespace-only text does not count as content, and removal works bottom
/// up so a parent emptied by the pass is removed as well. `Header` and `Body`
/// themselves are kept. Attributes do not make an element non-empty.
pub struct RemoveEmptyNodesMiddleware;

impl RemoveEmptyNodesMiddleware {
    pub fn new() -> Self {
        Self
    }

    fn clean(&self, request: SoapRequest) -> Result<SoapRequest, SoapError> {
        let mut view = SoapXmlView::from_request(&request)?;

        let mut removed = prune_children(view.body_mut()?);
        if view.header().is_some() {
            removed += prune_children(view.header_mut()?);
        }

        if removed == 0 {
            return Ok(request);
        }

        debug!(removed = removed, "Removed empty envelope nodes");
        view.into_request(request)
    }
}

impl Default for RemoveEmptyNodesMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for RemoveEmptyNodesMiddleware {
    fn name(&self) -> &str {
        "remove_empty_nodes"
    }

    async fn before_request(
        &self,
        request: SoapRequest,
        options: CallOptions,
        next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        let request = self.clean(request)?;
        next.run(request, options).await
    }
}

/// Prune the children of `parent`, returning how many elements were removed.
fn prune_children(parent: &mut Element) -> usize {
    let mut removed = 0;
    for node in parent.children.iter_mut() {
        if let XMLNode::Element(child) = node {
            removed += prune_children(child);
        }
    }

    let before = parent.children.len();
    parent.children.retain(|node| match node {
        XMLNode::Element(child) => !is_empty(child),
        _ => true,
    });
    removed + before - parent.children.len()
}

fn is_empty(el: &Element) -> bool {
    el.children
        .iter()
        .all(|node| matches!(node, XMLNode::Text(text) if text.trim().is_empty()))
}
