//! Namespace-aware access to a SOAP envelope.
//!
//! [`SoapXmlView`] is a transient projection over a request or response body:
//! parse it, edit headers or body in place, then serialize it back into the
//! message. Documents are read with quick-xml into an `xmltree` tree, which
//! also serializes them.

use bytes::Bytes;
use std::collections::HashMap;
use xmltree::{Element, Namespace, XMLNode};

use crate::config::SoapVersion;
use crate::error::SoapError;
use crate::message::{SoapRequest, SoapResponse};

mod parse;
mod xpath;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";

/// Prefix under which the envelope's own namespace is registered for queries.
pub const SOAP_PREFIX: &str = "soap";

const HEADER: &str = "Header";
const BODY: &str = "Body";

/// Mutable view over a parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapXmlView {
    root: Element,
    version: SoapVersion,
    /// Prefix bindings used by [`SoapXmlView::xpath`]
    query_namespaces: HashMap<String, String>,
}

impl SoapXmlView {
    /// Parse raw bytes as a SOAP envelope.
    ///
    /// The root must be an `Envelope` in the SOAP 1.1 or 1.2 namespace and
    /// must contain a `Body`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SoapError> {
        let root = parse::parse_document(data)?;

        let version = root
            .namespace
            .as_deref()
            .and_then(SoapVersion::from_namespace)
            .filter(|_| root.name == "Envelope")
            .ok_or_else(|| {
                SoapError::InvalidEnvelope(format!(
                    "root element '{}' is not a SOAP Envelope with a recognized namespace",
                    root.name
                ))
            })?;

        let view = Self {
            root,
            version,
            query_namespaces: HashMap::from([(
                SOAP_PREFIX.to_string(),
                version.namespace().to_string(),
            )]),
        };

        if view.child_index(BODY).is_none() {
            return Err(SoapError::InvalidEnvelope(
                "SOAP Envelope has no Body".to_string(),
            ));
        }

        Ok(view)
    }

    pub fn from_request(request: &SoapRequest) -> Result<Self, SoapError> {
        Self::from_bytes(request.body())
    }

    pub fn from_response(response: &SoapResponse) -> Result<Self, SoapError> {
        Self::from_bytes(response.body())
    }

    pub fn envelope(&self) -> &Element {
        &self.root
    }

    pub fn envelope_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn soap_version(&self) -> SoapVersion {
        self.version
    }

    /// The SOAP namespace URI in effect for this envelope.
    pub fn envelope_namespace(&self) -> &'static str {
        self.version.namespace()
    }

    /// The header element, if the envelope has one. Never creates it.
    pub fn header(&self) -> Option<&Element> {
        self.child_index(HEADER).and_then(|i| as_element(&self.root.children[i]))
    }

    /// The header element, created as the envelope's first child when absent.
    pub fn header_mut(&mut self) -> Result<&mut Element, SoapError> {
        let index = match self.child_index(HEADER) {
            Some(index) => index,
            None => {
                let mut header = Element::new(HEADER);
                header.prefix = self.root.prefix.clone();
                header.namespace = Some(self.envelope_namespace().to_string());
                self.root.children.insert(0, XMLNode::Element(header));
                0
            }
        };

        as_element_mut(&mut self.root.children[index])
            .ok_or_else(|| SoapError::InvalidEnvelope("SOAP Header is not an element".to_string()))
    }

    pub fn body(&self) -> Result<&Element, SoapError> {
        self.child_index(BODY)
            .and_then(|i| as_element(&self.root.children[i]))
            .ok_or_else(|| SoapError::InvalidEnvelope("SOAP Envelope has no Body".to_string()))
    }

    pub fn body_mut(&mut self) -> Result<&mut Element, SoapError> {
        let index = self
            .child_index(BODY)
            .ok_or_else(|| SoapError::InvalidEnvelope("SOAP Envelope has no Body".to_string()))?;
        as_element_mut(&mut self.root.children[index])
            .ok_or_else(|| SoapError::InvalidEnvelope("SOAP Body is not an element".to_string()))
    }

    /// Namespace URI bound to `prefix` on the envelope element.
    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.root.namespaces.as_ref().and_then(|ns| ns.get(prefix))
    }

    /// Declare `prefix` on the envelope.
    ///
    /// Re-declaring the same binding is a no-op; binding an existing prefix
    /// to a different URI fails with [`SoapError::NamespaceConflict`].
    pub fn add_envelope_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SoapError> {
        let namespaces = self.root.namespaces.get_or_insert_with(Namespace::empty);
        match namespaces.get(prefix).map(str::to_string) {
            Some(existing) if existing == uri => Ok(()),
            Some(existing) => Err(SoapError::NamespaceConflict {
                prefix: prefix.to_string(),
                existing,
            }),
            None => {
                namespaces.put(prefix, uri);
                Ok(())
            }
        }
    }

    /// Create a header block `prefix:name` in namespace `uri`.
    pub fn create_soap_header(&self, prefix: &str, name: &str, uri: &str) -> Element {
        element(prefix, name, uri)
    }

    /// Insert `header` as the first child of the header element, creating
    /// the header element if needed. Existing header blocks keep their order.
    pub fn prepend_soap_header(&mut self, header: Element) -> Result<(), SoapError> {
        self.header_mut()?.children.insert(0, XMLNode::Element(header));
        Ok(())
    }

    /// Bind `prefix` for use in [`SoapXmlView::xpath`]. A later binding of the
    /// same prefix replaces the earlier one.
    pub fn register_namespace(&mut self, prefix: &str, uri: &str) {
        self.query_namespaces
            .insert(prefix.to_string(), uri.to_string());
    }

    /// Select elements by a location path such as `/soap:Envelope/soap:Body/*`
    /// or `//wsse:Security`.
    ///
    /// Steps are `name`, `prefix:name`, `prefix:*` or `*`, separated by `/`
    /// (child) or `//` (descendant). Every prefix must have been registered.
    pub fn xpath(&self, expr: &str) -> Result<Vec<&Element>, SoapError> {
        let steps = xpath::compile(expr, &self.query_namespaces)?;
        Ok(xpath::select(&self.root, &steps))
    }

    /// Serialize the (possibly edited) document.
    pub fn to_bytes(&self) -> Result<Bytes, SoapError> {
        let mut out = Vec::new();
        self.root
            .write(&mut out)
            .map_err(|e| SoapError::XmlWrite(e.to_string()))?;
        Ok(Bytes::from(out))
    }

    /// Replace the request body with this document.
    pub fn into_request(self, request: SoapRequest) -> Result<SoapRequest, SoapError> {
        Ok(request.with_body(self.to_bytes()?))
    }

    /// Replace the response body with this document.
    pub fn into_response(self, response: SoapResponse) -> Result<SoapResponse, SoapError> {
        Ok(response.with_body(self.to_bytes()?))
    }

    fn child_index(&self, local_name: &str) -> Option<usize> {
        let namespace = self.envelope_namespace();
        self.root.children.iter().position(|node| {
            as_element(node).is_some_and(|e| is_named(e, namespace, local_name))
        })
    }
}

/// Create an empty element `prefix:name` that declares its own namespace.
pub fn element(prefix: &str, name: &str, uri: &str) -> Element {
    let mut namespaces = Namespace::empty();
    namespaces.put(prefix, uri);

    let mut el = Element::new(name);
    el.prefix = Some(prefix.to_string());
    el.namespace = Some(uri.to_string());
    el.namespaces = Some(namespaces);
    el
}

/// Create `prefix:name` holding a single text node.
pub fn text_element(prefix: &str, name: &str, uri: &str, text: impl Into<String>) -> Element {
    let mut el = element(prefix, name, uri);
    el.children.push(XMLNode::Text(text.into()));
    el
}

/// Whether `el` is `{namespace}local_name`.
pub fn is_named(el: &Element, namespace: &str, local_name: &str) -> bool {
    el.name == local_name && el.namespace.as_deref() == Some(namespace)
}

/// Concatenated text and CDATA content of `el`'s direct children.
pub fn text_of(el: &Element) -> String {
    el.children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Text(t) | XMLNode::CData(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

/// Direct element children of `el`.
pub fn child_elements(el: &Element) -> impl Iterator<Item = &Element> {
    el.children.iter().filter_map(as_element)
}

fn as_element(node: &XMLNode) -> Option<&Element> {
    match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    }
}

fn as_element_mut(node: &mut XMLNode) -> Option<&mut Element> {
    match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    }
}
