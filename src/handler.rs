//! The handler seam between the chain and whatever sends bytes.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::error::SoapError;
use crate::message::{CallOptions, SoapRequest, SoapResponse};

/// Maps a request plus its options to a response.
///
/// The innermost handler is the transport; a [`ChainedHandler`] is a handler
/// too, so a composed chain can be installed wherever a transport is expected.
///
/// [`ChainedHandler`]: crate::chain::ChainedHandler
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        request: SoapRequest,
        options: CallOptions,
    ) -> Result<SoapResponse, SoapError>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(
        &self,
        request: SoapRequest,
        options: CallOptions,
    ) -> Result<SoapResponse, SoapError> {
        (**self).handle(request, options).await
    }
}

/// Wrap an async closure as a [`Handler`].
///
/// ```ignore
/// let transport = handler_fn(|_req, _opts| async {
///     Ok(SoapResponse::new(StatusCode::OK, "<ok/>"))
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(SoapRequest, CallOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SoapResponse, SoapError>> + Send + 'static,
{
    HandlerFn(f)
}

/// Handler returned by [`handler_fn`].
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(SoapRequest, CallOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SoapResponse, SoapError>> + Send + 'static,
{
    async fn handle(
        &self,
        request: SoapRequest,
        options: CallOptions,
    ) -> Result<SoapResponse, SoapError> {
        (self.0)(request, options).await
    }
}
