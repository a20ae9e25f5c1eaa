//! Build an `xmltree` document from bytes with quick-xml.
//!
//! Attribute names are kept qualified (`xsi:type`, `wsu:Id`) so the tree
//! serializes back to an equivalent document. Element prefixes are resolved
//! against in-scope `xmlns` declarations while reading. quick-xml does not
//! expand custom entities, so external entity references fail to parse.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use xmltree::{Element, Namespace, XMLNode};

use crate::error::SoapError;

/// `xmlns` declarations made by one open element; the default namespace has
/// an empty prefix.
type Scope = Vec<(String, String)>;

/// Parse `data` into its root element.
///
/// Whitespace-only text is dropped; comments are kept. Processing
/// instructions are skipped since SOAP messages may not carry them.
pub(crate) fn parse_document(data: &[u8]) -> Result<Element, SoapError> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut open: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_error(reader.buffer_position(), e))?;

        match event {
            Event::Start(e) => {
                open.push(start_element(&e, &mut scopes)?);
            }
            Event::Empty(e) => {
                let el = start_element(&e, &mut scopes)?;
                scopes.pop();
                close(el, &mut open, &mut root)?;
            }
            Event::End(_) => {
                scopes.pop();
                let el = open
                    .pop()
                    .ok_or_else(|| SoapError::XmlParse("unexpected end tag".to_string()))?;
                close(el, &mut open, &mut root)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| parse_error(reader.buffer_position(), e))?;
                if !text.trim().is_empty() {
                    push_child(&mut open, XMLNode::Text(text.into_owned()))?;
                }
            }
            Event::CData(c) => {
                let text = std::str::from_utf8(&c)
                    .map_err(|e| SoapError::XmlParse(format!("CDATA is not UTF-8: {}", e)))?
                    .to_string();
                push_child(&mut open, XMLNode::CData(text))?;
            }
            Event::Comment(c) => {
                let text = c
                    .unescape()
                    .map_err(|e| parse_error(reader.buffer_position(), e))?;
                if !open.is_empty() {
                    push_child(&mut open, XMLNode::Comment(text.into_owned()))?;
                }
            }
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
        buf.clear();
    }

    if !open.is_empty() {
        return Err(SoapError::XmlParse(format!(
            "unexpected end of document inside <{}>",
            open.last().map(|e| e.name.as_str()).unwrap_or_default()
        )));
    }
    root.ok_or_else(|| SoapError::XmlParse("document has no root element".to_string()))
}

fn parse_error(position: impl std::fmt::Display, e: impl std::fmt::Display) -> SoapError {
    SoapError::XmlParse(format!("at position {}: {}", position, e))
}

fn utf8(bytes: &[u8]) -> Result<&str, SoapError> {
    std::str::from_utf8(bytes).map_err(|e| SoapError::XmlParse(format!("name is not UTF-8: {}", e)))
}

/// Turn a start tag into an element, pushing its declarations onto `scopes`.
fn start_element(e: &BytesStart, scopes: &mut Vec<Scope>) -> Result<Element, SoapError> {
    let mut declarations = Scope::new();
    let mut attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|e| SoapError::XmlParse(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| SoapError::XmlParse(e.to_string()))?
            .into_owned();

        if key == "xmlns" {
            declarations.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.push((prefix.to_string(), value));
        } else {
            attributes.push((key, value));
        }
    }
    scopes.push(declarations);

    let name = e.name();
    let qname = utf8(name.as_ref())?;
    let (prefix, local) = match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    };

    let namespace = resolve(scopes, prefix.unwrap_or("")).map(str::to_string);
    if let (Some(prefix), None) = (prefix, &namespace) {
        return Err(SoapError::XmlParse(format!(
            "element <{}> uses undeclared prefix '{}'",
            qname, prefix
        )));
    }

    let mut el = Element::new(local);
    el.prefix = prefix.map(str::to_string);
    el.namespace = namespace.filter(|uri| !uri.is_empty());

    if let Some(declarations) = scopes.last().filter(|d| !d.is_empty()) {
        let mut namespaces = Namespace::empty();
        for (prefix, uri) in declarations {
            namespaces.put(prefix.as_str(), uri.as_str());
        }
        el.namespaces = Some(namespaces);
    }

    for (key, value) in attributes {
        el.attributes.insert(key, value);
    }
    Ok(el)
}

fn resolve<'a>(scopes: &'a [Scope], prefix: &str) -> Option<&'a str> {
    scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter().rev())
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
}

fn push_child(open: &mut [Element], node: XMLNode) -> Result<(), SoapError> {
    match open.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None => Err(SoapError::XmlParse("content outside the root element".to_string())),
    }
}

fn close(el: Element, open: &mut [Element], root: &mut Option<Element>) -> Result<(), SoapError> {
    if let Some(parent) = open.last_mut() {
        parent.children.push(XMLNode::Element(el));
        return Ok(());
    }
    if root.is_some() {
        return Err(SoapError::XmlParse("document has more than one root element".to_string()));
    }
    *root = Some(el);
    Ok(())
}
