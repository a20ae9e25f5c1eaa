//! HTTP Basic authentication.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::header::AUTHORIZATION;

use crate::error::SoapError;
use crate::message::{CallOptions, SoapRequest, SoapResponse};
use crate::middleware::{Middleware, Next};

/// Adds `Authorization: Basic …` to every outgoing request.
pub struct BasicAuthMiddleware {
    header_value: String,
}

impl BasicAuthMiddleware {
    pub fn new(username: &str, password: &str) -> Self {
        let credentials = STANDARD.encode(format!("{}:{}", username, password));
        Self {
            header_value: format!("Basic {}", credentials),
        }
    }
}

#[async_trait]
impl Middleware for BasicAuthMiddleware {
    fn name(&self) -> &str {
        "basic_auth"
    }

    async fn before_request(
        &self,
        request: SoapRequest,
        options: CallOptions,
        next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        let request = request.with_header(AUTHORIZATION, &self.header_value)?;
        next.run(request, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MiddlewareChain;
    use crate::handler::handler_fn;
    use http::{Method, StatusCode};

    #[tokio::test]
    async fn test_authorization_header_decodes_to_credentials() {
        let mut chain = MiddlewareChain::new();
        chain.add(BasicAuthMiddleware::new("user", "pass")).unwrap();

        let transport = handler_fn(|request: SoapRequest, _opts| async move {
            let header = request.header("authorization").unwrap_or_default().to_string();
            Ok(SoapResponse::new(StatusCode::OK, header))
        });

        let response = chain
            .run(
                &transport,
                SoapRequest::new(Method::POST, "http://example.org/svc"),
                CallOptions::default(),
            )
            .await
            .unwrap();

        let header = std::str::from_utf8(response.body()).unwrap();
        let encoded = header.strip_prefix("Basic ").unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), b"user:pass");
    }

    #[tokio::test]
    async fn test_replaces_existing_authorization() {
        let mut chain = MiddlewareChain::new();
        chain.add(BasicAuthMiddleware::new("user", "pass")).unwrap();

        let transport = handler_fn(|request: SoapRequest, _opts| async move {
            assert_eq!(request.headers().get_all("authorization").iter().count(), 1);
            Ok(SoapResponse::new(StatusCode::OK, ""))
        });

        let request = SoapRequest::new(Method::POST, "http://example.org/svc")
            .with_header(AUTHORIZATION, "Bearer stale")
            .unwrap();
        chain
            .run(&transport, request, CallOptions::default())
            .await
            .unwrap();
    }
}
