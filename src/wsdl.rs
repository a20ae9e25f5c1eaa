//! WSDL retrieval through its own middleware chain.
//!
//! Service calls and WSDL fetches use separate chains: a WS-Security header
//! makes no sense on a `GET ?wsdl`, while extension rewriting only applies to
//! service descriptions.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::ACCEPT;
use http::Method;
use tracing::{debug, warn};

use crate::chain::MiddlewareChain;
use crate::error::SoapError;
use crate::handler::Handler;
use crate::message::{CallOptions, SoapRequest};
use crate::middleware::Middleware;

/// Fetches WSDL documents.
#[async_trait]
pub trait WsdlProvider: Send + Sync {
    async fn provide(&self, location: &str) -> Result<Bytes, SoapError>;
}

/// Fetches WSDL documents with a GET through a dedicated chain.
pub struct HttpWsdlProvider<T> {
    transport: T,
    chain: MiddlewareChain,
    options: CallOptions,
}

impl<T: Handler> HttpWsdlProvider<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            chain: MiddlewareChain::new(),
            options: CallOptions::default(),
        }
    }

    /// Use an already built chain, e.g. from [`WsdlConfig::build_chain`].
    ///
    /// [`WsdlConfig::build_chain`]: crate::config::WsdlConfig::build_chain
    pub fn with_chain(mut self, chain: MiddlewareChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Register a middleware on the WSDL chain only.
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> Result<&mut Self, SoapError> {
        self.chain.add(middleware)?;
        Ok(self)
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }
}

#[async_trait]
impl<T: Handler> WsdlProvider for HttpWsdlProvider<T> {
    async fn provide(&self, location: &str) -> Result<Bytes, SoapError> {
        let request = SoapRequest::new(Method::GET, location)
            .with_header(ACCEPT, "text/xml, application/xml, application/wsdl+xml")?;

        debug!(location = location, "Fetching WSDL");
        let response = self
            .chain
            .run(&self.transport, request, self.options.clone())
            .await?;

        if !response.status().is_success() {
            warn!(location = location, status = %response.status(), "WSDL fetch failed");
            return Err(SoapError::Wsdl(format!(
                "GET {} returned {}",
                location,
                response.status()
            )));
        }

        debug!(location = location, bytes = response.body().len(), "Fetched WSDL");
        Ok(response.body().clone())
    }
}
