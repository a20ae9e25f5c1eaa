//! WS-Addressing headers.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;
use xmltree::XMLNode;

use crate::error::SoapError;
use crate::message::{CallOptions, SoapRequest, SoapResponse};
use crate::middleware::{Middleware, Next};
use crate::xml::{element, text_element, SoapXmlView, WSA_NS};

/// Anonymous endpoint address.
pub const WSA_ANONYMOUS: &str = "http://www.w3.org/2005/08/addressing/anonymous";

const WSA_PREFIX: &str = "wsa";

/// Adds `Action`, `To`, `MessageID` and `ReplyTo` to the envelope header.
pub struct WsaMiddleware {
    reply_to: String,
}

impl WsaMiddleware {
    pub fn new() -> Self {
        Self {
            reply_to: WSA_ANONYMOUS.to_string(),
        }
    }

    pub fn with_reply_to(mut self, address: &str) -> Self {
        self.reply_to = address.to_string();
        self
    }

    fn add_headers(&self, request: SoapRequest) -> Result<SoapRequest, SoapError> {
        let action = request.soap_action().ok_or_else(|| {
            SoapError::InvalidEnvelope("WS-Addressing requires a SOAP action".to_string())
        })?;
        let message_id = format!("urn:uuid:{}", Uuid::new_v4());

        let mut view = SoapXmlView::from_request(&request)?;
        view.add_envelope_namespace(WSA_PREFIX, WSA_NS)?;

        let mut reply_to = element(WSA_PREFIX, "ReplyTo", WSA_NS);
        reply_to.children.push(XMLNode::Element(text_element(
            WSA_PREFIX,
            "Address",
            WSA_NS,
            self.reply_to.as_str(),
        )));

        // Prepending in reverse leaves Action, To, MessageID, ReplyTo in order.
        view.prepend_soap_header(reply_to)?;
        view.prepend_soap_header(text_element(WSA_PREFIX, "MessageID", WSA_NS, message_id.as_str()))?;
        view.prepend_soap_header(text_element(WSA_PREFIX, "To", WSA_NS, request.uri()))?;
        view.prepend_soap_header(text_element(WSA_PREFIX, "Action", WSA_NS, action.as_str()))?;

        debug!(action = %action, message_id = %message_id, "Added WS-Addressing headers");
        view.into_request(request)
    }
}

impl Default for WsaMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for WsaMiddleware {
    fn name(&self) -> &str {
        "wsa"
    }

    async fn before_request(
        &self,
        request: SoapRequest,
        options: CallOptions,
        next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        let request = self.add_headers(request)?;
        next.run(request, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoapVersion;
    use crate::xml::{child_elements, text_of};

    const ENVELOPE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header><t:Trace xmlns:t="urn:trace">1</t:Trace></soap:Header>
  <soap:Body><m:Ping xmlns:m="urn:ping"/></soap:Body>
</soap:Envelope>"#;

    fn request(version: SoapVersion) -> SoapRequest {
        SoapRequest::soap(version, "http://example.org/svc", "urn:Ping", ENVELOPE).unwrap()
    }

    #[test]
    fn test_adds_addressing_headers_first() {
        let request = WsaMiddleware::new().add_headers(request(SoapVersion::Soap11)).unwrap();
        let mut view = SoapXmlView::from_request(&request).unwrap();
        view.register_namespace("wsa", WSA_NS);

        let names: Vec<_> = child_elements(view.header().unwrap())
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["Action", "To", "MessageID", "ReplyTo", "Trace"]);

        let action = view.xpath("/soap:Envelope/soap:Header/wsa:Action").unwrap();
        assert_eq!(text_of(action[0]), "urn:Ping");
        let to = view.xpath("//wsa:To").unwrap();
        assert_eq!(text_of(to[0]), "http://example.org/svc");
        let id = view.xpath("//wsa:MessageID").unwrap();
        assert!(text_of(id[0]).starts_with("urn:uuid:"));
        let address = view.xpath("//wsa:ReplyTo/wsa:Address").unwrap();
        assert_eq!(text_of(address[0]), WSA_ANONYMOUS);
    }

    #[test]
    fn test_action_from_soap_12_content_type() {
        let request = WsaMiddleware::new()
            .with_reply_to("http://client.example.org/callback")
            .add_headers(request(SoapVersion::Soap12))
            .unwrap();
        let mut view = SoapXmlView::from_request(&request).unwrap();
        view.register_namespace("wsa", WSA_NS);

        assert_eq!(text_of(view.xpath("//wsa:Action").unwrap()[0]), "urn:Ping");
        assert_eq!(
            text_of(view.xpath("//wsa:Address").unwrap()[0]),
            "http://client.example.org/callback"
        );
    }

    #[test]
    fn test_message_ids_are_unique() {
        let wsa = WsaMiddleware::new();
        let id_of = |request: SoapRequest| {
            let mut view = SoapXmlView::from_request(&request).unwrap();
            view.register_namespace("wsa", WSA_NS);
            let id = text_of(view.xpath("//wsa:MessageID").unwrap()[0]);
            id
        };
        let first = id_of(wsa.add_headers(request(SoapVersion::Soap11)).unwrap());
        let second = id_of(wsa.add_headers(request(SoapVersion::Soap11)).unwrap());
        assert_ne!(first, second);
    }

    #[test]
    fn test_missing_action_fails() {
        let request = SoapRequest::new(http::Method::POST, "http://example.org/svc").with_body(ENVELOPE);
        let err = WsaMiddleware::new().add_headers(request).unwrap_err();
        assert!(matches!(err, SoapError::InvalidEnvelope(_)));
    }
}
