//! HTTP transport backed by reqwest.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::SoapError;
use crate::handler::Handler;
use crate::message::{CallOptions, SoapRequest, SoapResponse, TransportAuth};

const USER_AGENT: &str = concat!("soap-middleware/", env!("CARGO_PKG_VERSION"));

/// Innermost handler: sends the request over HTTP(S).
///
/// `CallOptions::timeout` bounds the whole exchange. NTLM is not supported by
/// the underlying client, so a call carrying [`TransportAuth::Ntlm`] fails
/// instead of going out unauthenticated.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, SoapError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SoapError::Transport(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, TLS roots, pooling).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Handler for HttpTransport {
    async fn handle(
        &self,
        request: SoapRequest,
        options: CallOptions,
    ) -> Result<SoapResponse, SoapError> {
        if let Some(TransportAuth::Ntlm { .. }) = &options.auth {
            return Err(SoapError::Transport(
                "NTLM authentication is not supported by the HTTP transport".to_string(),
            ));
        }

        let mut builder = self
            .client
            .request(request.method().clone(), request.uri())
            .headers(request.headers().clone())
            .body(request.body().clone());
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SoapError::Transport(format!("{} {}: {}", request.method(), request.uri(), e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| SoapError::Transport(format!("failed to read response body: {}", e)))?;

        debug!(uri = request.uri(), status = %status, bytes = body.len(), "HTTP exchange finished");
        Ok(SoapResponse::from_parts(status, headers, body))
    }
}
