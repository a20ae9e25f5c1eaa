//! The middleware contract and the built-in middlewares.
//!
//! A middleware wraps the rest of the chain: [`Middleware::before_request`]
//! receives [`Next`] and decides whether and how to call into it, and
//! [`Middleware::after_response`] transforms whatever came back. Layers run
//! their pre-send hooks in registration order and their post-receive hooks in
//! reverse.
//!
//! ```text
//!  caller ─► mw[0].before ─► mw[1].before ─► … ─► transport
//!  caller ◄─ mw[0].after  ◄─ mw[1].after  ◄─ … ◄─┘
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use crate::error::SoapError;
use crate::handler::Handler;
use crate::message::{CallOptions, SoapRequest, SoapResponse};

pub mod basic_auth;
pub mod disable_extensions;
pub mod ntlm;
pub mod remove_empty_nodes;
pub mod wsa;
pub mod wsse;

pub use basic_auth::BasicAuthMiddleware;
pub use disable_extensions::DisableExtensionsMiddleware;
pub use ntlm::NtlmMiddleware;
pub use remove_empty_nodes::RemoveEmptyNodesMiddleware;
pub use wsa::WsaMiddleware;
pub use wsse::{KeyMaterial, SecurityProvider, WsseBuilder, WsseMiddleware};

/// A named request/response interceptor.
///
/// Only [`name`](Middleware::name) is required; both hooks default to
/// pass-through. Middleware instances are shared across concurrent calls, so
/// per-call state must travel in the request and options, never in `self`.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stable identifier, unique within a chain.
    fn name(&self) -> &str;

    /// Pre-send hook.
    ///
    /// Forward with `next.run(request, options)` or short-circuit by
    /// returning without calling it.
    async fn before_request(
        &self,
        request: SoapRequest,
        options: CallOptions,
        next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        next.run(request, options).await
    }

    /// Post-receive hook. Must not perform I/O.
    fn after_response(&self, response: SoapResponse) -> Result<SoapResponse, SoapError> {
        Ok(response)
    }
}

/// The remainder of a chain, down to and including the transport.
pub struct Next<'a> {
    transport: &'a dyn Handler,
    middlewares: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(transport: &'a dyn Handler, middlewares: &'a [Arc<dyn Middleware>]) -> Self {
        Self {
            transport,
            middlewares,
        }
    }

    /// Run the rest of the chain with the given request.
    ///
    /// An error from an inner layer skips the current layer's
    /// `after_response` and is returned as-is.
    pub async fn run(
        self,
        request: SoapRequest,
        options: CallOptions,
    ) -> Result<SoapResponse, SoapError> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                trace!(
                    middleware = current.name(),
                    remaining = rest.len(),
                    "Entering middleware"
                );
                let next = Next::new(self.transport, rest);
                let response = current.before_request(request, options, next).await?;
                current.after_response(response)
            }
            None => {
                trace!(method = %request.method(), uri = request.uri(), "Dispatching to transport");
                self.transport.handle(request, options).await
            }
        }
    }
}
