//! Request, response and per-call option values that flow through the chain.
//!
//! Both message types are values: transforming operations consume `self` and
//! hand back a new message, so a middleware never observes a half-edited
//! request owned by someone else.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::time::Duration;

use crate::config::SoapVersion;
use crate::error::SoapError;

/// `SOAPAction` HTTP header (SOAP 1.1).
pub const SOAP_ACTION: HeaderName = HeaderName::from_static("soapaction");

/// An outbound SOAP call.
#[derive(Debug, Clone)]
pub struct SoapRequest {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
}

impl SoapRequest {
    /// Create an empty request.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Create a POST carrying `envelope`, with the content type and action
    /// headers the given SOAP version expects.
    pub fn soap(
        version: SoapVersion,
        uri: impl Into<String>,
        action: &str,
        envelope: impl Into<Bytes>,
    ) -> Result<Self, SoapError> {
        let request = Self::new(Method::POST, uri).with_body(envelope);
        match version {
            SoapVersion::Soap11 => request
                .with_header(CONTENT_TYPE, version.content_type())?
                .with_header(SOAP_ACTION, &format!("\"{}\"", action)),
            SoapVersion::Soap12 => request.with_header(
                CONTENT_TYPE,
                &format!("{}; action=\"{}\"", version.content_type(), action),
            ),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// Replace every value of `name` with `value`.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self, SoapError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| SoapError::InvalidHeader(format!("{}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The SOAP action of this call.
    ///
    /// Taken from the `SOAPAction` header, falling back to the `action`
    /// parameter of a SOAP 1.2 content type.
    pub fn soap_action(&self) -> Option<String> {
        if let Some(action) = self.headers.get(&SOAP_ACTION).and_then(|v| v.to_str().ok()) {
            let action = parse_soap_action(action);
            if !action.is_empty() {
                return Some(action);
            }
        }

        let content_type = self.header(CONTENT_TYPE.as_str())?;
        content_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("action="))
            .map(parse_soap_action)
            .find(|action| !action.is_empty())
    }
}

/// A SOAP response coming back from the transport.
#[derive(Debug, Clone)]
pub struct SoapResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl SoapResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self, SoapError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| SoapError::InvalidHeader(format!("{}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Per-call transport options threaded through the chain with the request.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overall timeout for the exchange, enforced by the transport
    pub timeout: Option<Duration>,
    /// Connection-level authentication the transport must negotiate
    pub auth: Option<TransportAuth>,
}

/// Authentication schemes negotiated by the transport rather than carried as
/// a plain header.
#[derive(Clone, PartialEq, Eq)]
pub enum TransportAuth {
    Ntlm {
        username: String,
        password: String,
        domain: Option<String>,
    },
}

impl fmt::Debug for TransportAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ntlm {
                username, domain, ..
            } => f
                .debug_struct("Ntlm")
                .field("username", username)
                .field("password", &"***")
                .field("domain", domain)
                .finish(),
        }
    }
}

/// Extract a SOAP action from a header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
