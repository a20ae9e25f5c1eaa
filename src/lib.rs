//! Middleware chain for SOAP clients
//!
//! Wraps a SOAP transport in an ordered set of named request/response
//! interceptors and provides a namespace-aware view over SOAP envelopes for
//! the interceptors to edit.
//!
//! # Features
//!
//! - Ordered chain: pre-send hooks in registration order, post-receive hooks in reverse
//! - Short-circuiting and error recovery through [`Next`]
//! - HTTP Basic and NTLM authentication
//! - WS-Addressing headers
//! - WS-Security timestamp, username token, and pluggable signing/encryption
//! - Empty node removal and WSDL extension relaxing
//! - Separate middleware chain for WSDL retrieval
//!
//! # Example
//!
//! ```ignore
//! use soap_middleware::{BasicAuthMiddleware, HttpTransport, SoapClient, WsaMiddleware};
//!
//! let client = SoapClient::builder(HttpTransport::new()?, "http://example.org/service")
//!     .add_middleware(BasicAuthMiddleware::new("user", "pass"))?
//!     .add_middleware(WsaMiddleware::new())?
//!     .build();
//!
//! let response = client.call("urn:GetUser", envelope).await?;
//! ```

pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod middleware;
pub mod transport;
pub mod wsdl;
pub mod xml;

pub use chain::{ChainedHandler, MiddlewareChain};
pub use client::{ClientBuilder, SoapClient};
pub use config::{ClientConfig, SoapVersion};
pub use error::SoapError;
pub use handler::{handler_fn, Handler};
pub use message::{CallOptions, SoapRequest, SoapResponse, TransportAuth};
pub use middleware::{
    BasicAuthMiddleware, DisableExtensionsMiddleware, KeyMaterial, Middleware, Next,
    NtlmMiddleware, RemoveEmptyNodesMiddleware, SecurityProvider, WsaMiddleware, WsseBuilder,
    WsseMiddleware,
};
pub use transport::HttpTransport;
pub use wsdl::{HttpWsdlProvider, WsdlProvider};
pub use xml::SoapXmlView;
