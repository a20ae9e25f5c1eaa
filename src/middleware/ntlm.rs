//! NTLM authentication.
//!
//! The handshake itself belongs to the transport; this middleware only asks
//! for it through [`CallOptions::auth`].

use async_trait::async_trait;
use tracing::debug;

use crate::error::SoapError;
use crate::message::{CallOptions, SoapRequest, SoapResponse, TransportAuth};
use crate::middleware::{Middleware, Next};

pub struct NtlmMiddleware {
    username: String,
    password: String,
    domain: Option<String>,
}

impl NtlmMiddleware {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }
}

#[async_trait]
impl Middleware for NtlmMiddleware {
    fn name(&self) -> &str {
        "ntlm"
    }

    async fn before_request(
        &self,
        request: SoapRequest,
        mut options: CallOptions,
        next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        debug!(username = %self.username, domain = ?self.domain, "Requesting NTLM authentication");
        options.auth = Some(TransportAuth::Ntlm {
            username: self.username.clone(),
            password: self.password.clone(),
            domain: self.domain.clone(),
        });
        next.run(request, options).await
    }
}
