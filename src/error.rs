//! Error types for the SOAP middleware layer.

use thiserror::Error;

/// Errors raised by the chain, the built-in middlewares and the XML view.
///
/// Middlewares pass through errors they do not handle, so a transport
/// failure reaches the caller as the same variant the transport produced.
#[derive(Error, Debug)]
pub enum SoapError {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("XML serialization error: {0}")]
    XmlWrite(String),

    #[error("Invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Namespace prefix '{prefix}' is already bound to '{existing}'")]
    NamespaceConflict { prefix: String, existing: String },

    #[error("Unbound namespace prefix: {0}")]
    UnboundPrefix(String),

    #[error("Invalid path expression: {0}")]
    InvalidPath(String),

    #[error("Middleware '{0}' is already registered")]
    DuplicateMiddleware(String),

    #[error("WS-Security error: {0}")]
    WsSecurity(String),

    #[error("WSDL error: {0}")]
    Wsdl(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SoapError {
    /// Short machine-readable code for this error, used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::XmlParse(_) => "XML_PARSE",
            Self::XmlWrite(_) => "XML_WRITE",
            Self::InvalidEnvelope(_) => "INVALID_ENVELOPE",
            Self::InvalidHeader(_) => "INVALID_HEADER",
            Self::NamespaceConflict { .. } => "NAMESPACE_CONFLICT",
            Self::UnboundPrefix(_) => "UNBOUND_PREFIX",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::DuplicateMiddleware(_) => "DUPLICATE_MIDDLEWARE",
            Self::WsSecurity(_) => "WS_SECURITY",
            Self::Wsdl(_) => "WSDL",
            Self::Transport(_) => "TRANSPORT",
            Self::Config(_) => "CONFIG",
        }
    }
}
