//! SOAP client with a middleware chain around its transport.

use bytes::Bytes;
use tracing::{debug, info};

use crate::chain::{ChainedHandler, MiddlewareChain};
use crate::config::{ClientConfig, SoapVersion};
use crate::error::SoapError;
use crate::handler::Handler;
use crate::message::{CallOptions, SoapRequest, SoapResponse};
use crate::middleware::Middleware;

/// Builder for [`SoapClient`].
pub struct ClientBuilder<T> {
    transport: T,
    endpoint: String,
    version: SoapVersion,
    options: CallOptions,
    chain: MiddlewareChain,
}

impl<T: Handler> ClientBuilder<T> {
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            version: SoapVersion::Soap11,
            options: CallOptions::default(),
            chain: MiddlewareChain::new(),
        }
    }

    /// Builder preloaded with the endpoint, version, options and middlewares
    /// of `config`.
    pub fn from_config(transport: T, config: &ClientConfig) -> Result<Self, SoapError> {
        if config.endpoint.is_empty() {
            return Err(SoapError::Config("endpoint is not set".to_string()));
        }

        Ok(Self {
            transport,
            endpoint: config.endpoint.clone(),
            version: config.soap_version,
            options: config.call_options(),
            chain: config.build_chain()?,
        })
    }

    pub fn soap_version(mut self, version: SoapVersion) -> Self {
        self.version = version;
        self
    }

    /// Default options for [`SoapClient::call`].
    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Register a middleware as the innermost layer so far.
    pub fn add_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Result<Self, SoapError> {
        self.chain.add(middleware)?;
        Ok(self)
    }

    pub fn build(self) -> SoapClient<T> {
        info!(
            endpoint = %self.endpoint,
            soap_version = ?self.version,
            middlewares = ?self.chain.names(),
            "SOAP client ready"
        );
        SoapClient {
            handler: self.chain.apply(self.transport),
            endpoint: self.endpoint,
            version: self.version,
            options: self.options,
        }
    }
}

/// Sends SOAP calls through its middleware chain.
pub struct SoapClient<T> {
    handler: ChainedHandler<T>,
    endpoint: String,
    version: SoapVersion,
    options: CallOptions,
}

impl<T: Handler> SoapClient<T> {
    pub fn builder(transport: T, endpoint: impl Into<String>) -> ClientBuilder<T> {
        ClientBuilder::new(transport, endpoint)
    }

    /// POST `envelope` to the endpoint with the client's default options.
    pub async fn call(&self, action: &str, envelope: impl Into<Bytes>) -> Result<SoapResponse, SoapError> {
        let request = SoapRequest::soap(self.version, self.endpoint.as_str(), action, envelope)?;
        debug!(action = action, "Calling SOAP operation");
        self.handler.handle(request, self.options.clone()).await
    }

    /// Send a prepared request with explicit options.
    pub async fn send(&self, request: SoapRequest, options: CallOptions) -> Result<SoapResponse, SoapError> {
        self.handler.handle(request, options).await
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn soap_version(&self) -> SoapVersion {
        self.version
    }

    /// Middleware names, outermost first.
    pub fn middleware_names(&self) -> Vec<&str> {
        self.handler.names()
    }
}
