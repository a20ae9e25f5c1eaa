//! Relax mandatory WSDL extensions in fetched service descriptions.
//!
//! Installed on the WSDL provider chain. The document is rewritten as a
//! stream with quick-xml, so everything other than the affected attributes
//! passes through byte for byte.

use async_trait::async_trait;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::error::SoapError;
use crate::message::SoapResponse;
use crate::middleware::Middleware;
use crate::xml::WSDL_NS;

/// Rewrites every `wsdl:required="true"` to `"false"`.
///
/// The prefix is resolved against in-scope `xmlns:*` declarations, so any
/// prefix bound to the WSDL 1.1 namespace is recognized.
pub struct DisableExtensionsMiddleware;

impl DisableExtensionsMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DisableExtensionsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for DisableExtensionsMiddleware {
    fn name(&self) -> &str {
        "disable_extensions"
    }

    fn after_response(&self, response: SoapResponse) -> Result<SoapResponse, SoapError> {
        if !response.status().is_success() {
            return Ok(response);
        }

        let (body, rewritten) = disable_required_extensions(response.body())?;
        if rewritten == 0 {
            return Ok(response);
        }

        debug!(rewritten = rewritten, "Disabled required WSDL extensions");
        Ok(response.with_body(body))
    }
}

/// Namespace declarations made by one open element.
type Scope = Vec<(Vec<u8>, Vec<u8>)>;

/// Returns the rewritten document and the number of attributes changed.
fn disable_required_extensions(xml: &[u8]) -> Result<(Vec<u8>, usize), SoapError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut scopes: Vec<Scope> = Vec::new();
    let mut rewritten = 0;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SoapError::XmlParse(format!("at position {}: {}", reader.buffer_position(), e)))?;

        let event = match event {
            Event::Start(e) => {
                scopes.push(declarations(&e)?);
                match relax(&e, &scopes)? {
                    Some(relaxed) => {
                        rewritten += 1;
                        Event::Start(relaxed)
                    }
                    None => Event::Start(e),
                }
            }
            Event::Empty(e) => {
                scopes.push(declarations(&e)?);
                let relaxed = relax(&e, &scopes)?;
                scopes.pop();
                match relaxed {
                    Some(relaxed) => {
                        rewritten += 1;
                        Event::Empty(relaxed)
                    }
                    None => Event::Empty(e),
                }
            }
            Event::End(e) => {
                scopes.pop();
                Event::End(e)
            }
            Event::Eof => break,
            other => other,
        };

        writer
            .write_event(event)
            .map_err(|e| SoapError::XmlWrite(e.to_string()))?;
        buf.clear();
    }

    Ok((writer.into_inner(), rewritten))
}

fn declarations(e: &BytesStart) -> Result<Scope, SoapError> {
    let mut scope = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SoapError::XmlParse(e.to_string()))?;
        if let Some(prefix) = attr.key.as_ref().strip_prefix(b"xmlns:") {
            scope.push((prefix.to_vec(), attr.value.to_vec()));
        }
    }
    Ok(scope)
}

fn resolve<'a>(scopes: &'a [Scope], prefix: &[u8]) -> Option<&'a [u8]> {
    scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter().rev())
        .find(|(p, _)| p.as_slice() == prefix)
        .map(|(_, uri)| uri.as_slice())
}

fn is_wsdl_required(key: &[u8], scopes: &[Scope]) -> bool {
    let Some(colon) = key.iter().position(|&b| b == b':') else {
        return false;
    };
    let (prefix, local) = (&key[..colon], &key[colon + 1..]);
    local == b"required" && resolve(scopes, prefix) == Some(WSDL_NS.as_bytes())
}

/// A copy of `e` with its WSDL `required` attribute set to false, or `None`
/// when nothing needs changing.
fn relax(e: &BytesStart, scopes: &[Scope]) -> Result<Option<BytesStart<'static>>, SoapError> {
    let mut attributes = Vec::new();
    let mut changed = false;

    for attr in e.attributes() {
        let attr = attr.map_err(|e| SoapError::XmlParse(e.to_string()))?;
        let key = attr.key.as_ref().to_vec();
        let value = if is_wsdl_required(&key, scopes) && attr.value.as_ref() == b"true" {
            changed = true;
            b"false".to_vec()
        } else {
            attr.value.to_vec()
        };
        attributes.push((key, value));
    }

    if !changed {
        return Ok(None);
    }

    let mut relaxed = e.clone().into_owned();
    relaxed.clear_attributes();
    for (key, value) in &attributes {
        relaxed.push_attribute(Attribute::from((key.as_slice(), value.as_slice())));
    }
    Ok(Some(relaxed))
}
