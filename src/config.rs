//! Configuration types for a SOAP client and its middleware chains.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chain::MiddlewareChain;
use crate::error::SoapError;
use crate::message::CallOptions;
use crate::middleware::{
    BasicAuthMiddleware, DisableExtensionsMiddleware, NtlmMiddleware, RemoveEmptyNodesMiddleware,
    WsaMiddleware, WsseMiddleware,
};
use crate::xml::{SOAP_11_NS, SOAP_12_NS};

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Config version
    pub version: String,

    /// Service endpoint URL
    pub endpoint: String,

    /// SOAP version used for outgoing calls
    pub soap_version: SoapVersion,

    /// Per-call timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,

    /// Middlewares in registration order (outermost first)
    pub middlewares: Vec<MiddlewareConfig>,

    /// WSDL retrieval settings
    pub wsdl: WsdlConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            endpoint: String::new(),
            soap_version: SoapVersion::Soap11,
            timeout_secs: 30,
            middlewares: Vec::new(),
            wsdl: WsdlConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Build the call chain described by `middlewares`.
    pub fn build_chain(&self) -> Result<MiddlewareChain, SoapError> {
        let mut chain = MiddlewareChain::new();
        for middleware in &self.middlewares {
            middleware.register(&mut chain)?;
        }
        Ok(chain)
    }

    /// Default options for every call.
    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            auth: None,
        }
    }

    /// Where to fetch the WSDL from: the configured location, else
    /// `<endpoint>?wsdl`.
    pub fn wsdl_location(&self) -> Option<String> {
        match &self.wsdl.location {
            Some(location) => Some(location.clone()),
            None if !self.endpoint.is_empty() => Some(format!("{}?wsdl", self.endpoint)),
            None => None,
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    /// Detect the version from an envelope namespace URI.
    pub fn from_namespace(uri: &str) -> Option<Self> {
        match uri {
            SOAP_11_NS => Some(Self::Soap11),
            SOAP_12_NS => Some(Self::Soap12),
            _ => None,
        }
    }

    /// Content type of a request body, without the action parameter.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }
}

/// A middleware entry in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MiddlewareConfig {
    /// HTTP Basic authentication
    BasicAuth { username: String, password: String },

    /// NTLM authentication negotiated by the transport.
    ///
    /// The built-in `HttpTransport` cannot negotiate NTLM and fails every
    /// call that asks for it; use a transport that reads `CallOptions::auth`.
    Ntlm {
        username: String,
        password: String,
        #[serde(default)]
        domain: Option<String>,
    },

    /// WS-Addressing headers
    WsAddressing {
        /// ReplyTo address (anonymous when unset)
        #[serde(default)]
        reply_to: Option<String>,
    },

    /// WS-Security header
    Wsse(WsseConfig),

    /// Strip empty elements from outgoing envelopes
    RemoveEmptyNodes,
}

impl MiddlewareConfig {
    fn register(&self, chain: &mut MiddlewareChain) -> Result<(), SoapError> {
        match self {
            Self::BasicAuth { username, password } => {
                chain.add(BasicAuthMiddleware::new(username, password))?;
            }
            Self::Ntlm {
                username,
                password,
                domain,
            } => {
                let mut ntlm = NtlmMiddleware::new(username, password);
                if let Some(domain) = domain {
                    ntlm = ntlm.with_domain(domain);
                }
                chain.add(ntlm)?;
            }
            Self::WsAddressing { reply_to } => {
                let mut wsa = WsaMiddleware::new();
                if let Some(address) = reply_to {
                    wsa = wsa.with_reply_to(address);
                }
                chain.add(wsa)?;
            }
            Self::Wsse(config) => {
                chain.add(config.build()?)?;
            }
            Self::RemoveEmptyNodes => {
                chain.add(RemoveEmptyNodesMiddleware::new())?;
            }
        }
        Ok(())
    }
}

/// WS-Security configuration.
///
/// Signing and encryption need a [`SecurityProvider`] and are only
/// available through [`WsseMiddleware::builder`].
///
/// [`SecurityProvider`]: crate::middleware::SecurityProvider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsseConfig {
    /// Timestamp lifetime in seconds
    pub timestamp_ttl_secs: u64,

    /// Set mustUnderstand on the Security header
    pub must_understand: bool,

    /// Optional username token
    pub username_token: Option<UsernameTokenConfig>,

    /// Reject responses whose Security timestamp has expired
    pub verify_response_timestamp: bool,
}

impl Default for WsseConfig {
    fn default() -> Self {
        Self {
            timestamp_ttl_secs: 3600,
            must_understand: true,
            username_token: None,
            verify_response_timestamp: false,
        }
    }
}

impl WsseConfig {
    pub fn build(&self) -> Result<WsseMiddleware, SoapError> {
        let mut builder = WsseMiddleware::builder()
            .with_timestamp(self.timestamp_ttl_secs)
            .must_understand(self.must_understand)
            .verify_response_timestamp(self.verify_response_timestamp);

        if let Some(token) = &self.username_token {
            builder = builder.with_user_token(&token.username, &token.password, token.password_type);
        }

        builder.build()
    }
}

/// WS-Security UsernameToken settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameTokenConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub password_type: PasswordType,
}

/// WS-Security UsernameToken password types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PasswordType {
    /// Plain text password (not recommended)
    #[serde(rename = "PasswordText")]
    PasswordText,
    /// Digested password (SHA-1 with nonce and timestamp)
    #[default]
    #[serde(rename = "PasswordDigest")]
    PasswordDigest,
}

impl PasswordType {
    /// Type URI carried in the Password element.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::PasswordText => "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText",
            Self::PasswordDigest => "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest",
        }
    }
}

/// WSDL retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsdlConfig {
    /// WSDL location (defaults to `<endpoint>?wsdl`)
    pub location: Option<String>,

    /// Force `wsdl:required="false"` on extension elements
    pub disable_extensions: bool,
}

impl Default for WsdlConfig {
    fn default() -> Self {
        Self {
            location: None,
            disable_extensions: true,
        }
    }
}

impl WsdlConfig {
    /// Build the chain applied to WSDL retrieval.
    pub fn build_chain(&self) -> Result<MiddlewareChain, SoapError> {
        let mut chain = MiddlewareChain::new();
        if self.disable_extensions {
            chain.add(DisableExtensionsMiddleware::new())?;
        }
        Ok(chain)
    }
}
