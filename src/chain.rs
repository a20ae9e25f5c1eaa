//! Ordered composition of middlewares around a transport.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SoapError;
use crate::handler::Handler;
use crate::message::{CallOptions, SoapRequest, SoapResponse};
use crate::middleware::{Middleware, Next};

/// An ordered set of uniquely named middlewares.
///
/// The first registered middleware is the outermost layer: its pre-send hook
/// runs first and its post-receive hook runs last.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware as the innermost layer.
    ///
    /// Fails with [`SoapError::DuplicateMiddleware`] if a middleware with the
    /// same name is already registered.
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) -> Result<&mut Self, SoapError> {
        self.add_shared(Arc::new(middleware))
    }

    /// Append an already shared middleware.
    pub fn add_shared(&mut self, middleware: Arc<dyn Middleware>) -> Result<&mut Self, SoapError> {
        if self.contains(middleware.name()) {
            return Err(SoapError::DuplicateMiddleware(middleware.name().to_string()));
        }

        debug!(
            middleware = middleware.name(),
            position = self.middlewares.len(),
            "Registered middleware"
        );
        self.middlewares.push(middleware);
        Ok(self)
    }

    /// Remove a middleware by name, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Middleware>> {
        let index = self.middlewares.iter().position(|m| m.name() == name)?;
        Some(self.middlewares.remove(index))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.middlewares.iter().any(|m| m.name() == name)
    }

    /// Registered names, outermost first.
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Compose the chain around `transport` into a single handler.
    pub fn apply<T: Handler>(self, transport: T) -> ChainedHandler<T> {
        ChainedHandler {
            middlewares: self.middlewares.into(),
            transport,
        }
    }

    /// Send one call through the chain without taking ownership of the
    /// transport.
    pub async fn run(
        &self,
        transport: &dyn Handler,
        request: SoapRequest,
        options: CallOptions,
    ) -> Result<SoapResponse, SoapError> {
        dispatch(transport, &self.middlewares, request, options).await
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// A chain bound to its transport; itself a [`Handler`].
pub struct ChainedHandler<T> {
    middlewares: Arc<[Arc<dyn Middleware>]>,
    transport: T,
}

impl<T> ChainedHandler<T> {
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }
}

#[async_trait]
impl<T: Handler> Handler for ChainedHandler<T> {
    async fn handle(
        &self,
        request: SoapRequest,
        options: CallOptions,
    ) -> Result<SoapResponse, SoapError> {
        dispatch(&self.transport, &self.middlewares, request, options).await
    }
}

async fn dispatch(
    transport: &dyn Handler,
    middlewares: &[Arc<dyn Middleware>],
    request: SoapRequest,
    options: CallOptions,
) -> Result<SoapResponse, SoapError> {
    let uri = request.uri().to_string();
    debug!(uri = %uri, middlewares = middlewares.len(), "Sending SOAP call through chain");

    let result = Next::new(transport, middlewares).run(request, options).await;
    match &result {
        Ok(response) => debug!(uri = %uri, status = %response.status(), "SOAP call completed"),
        Err(e) => warn!(uri = %uri, code = e.code(), error = %e, "SOAP call failed"),
    }
    result
}
