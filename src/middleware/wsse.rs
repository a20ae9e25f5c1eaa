//! WS-Security header: timestamp, username token, and delegated signing and
//! encryption.
//!
//! The XML signature and encryption algorithms live behind
//! [`SecurityProvider`]; this module only places the `wsse:Security` header
//! and calls the provider in the right order.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use xmltree::{Element, XMLNode};

use crate::config::{PasswordType, SoapVersion};
use crate::error::SoapError;
use crate::message::{CallOptions, SoapRequest, SoapResponse};
use crate::middleware::{Middleware, Next};
use crate::xml::{element, text_element, text_of, SoapXmlView, WSSE_NS, WSU_NS};

const WSSE_PREFIX: &str = "wsse";
const WSU_PREFIX: &str = "wsu";
const BASE64_ENCODING: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// Signs, encrypts, decrypts and verifies envelopes on behalf of
/// [`WsseMiddleware`].
///
/// `sign` is called after the Security header (timestamp and token) has been
/// prepended, so a provider can find it at `//wsse:Security`. It receives the
/// key registered with [`WsseBuilder::with_signature_key`], if any; a
/// provider without one loads its own keys.
pub trait SecurityProvider: Send + Sync {
    fn sign(&self, view: &mut SoapXmlView, key: Option<&KeyMaterial>) -> Result<(), SoapError>;

    fn encrypt(&self, _view: &mut SoapXmlView) -> Result<(), SoapError> {
        Err(SoapError::WsSecurity(
            "security provider does not support encryption".to_string(),
        ))
    }

    fn decrypt(&self, _view: &mut SoapXmlView) -> Result<(), SoapError> {
        Err(SoapError::WsSecurity(
            "security provider does not support decryption".to_string(),
        ))
    }

    fn verify(&self, _view: &SoapXmlView) -> Result<(), SoapError> {
        Err(SoapError::WsSecurity(
            "security provider does not support signature verification".to_string(),
        ))
    }
}

/// A PEM block (private key or certificate) handed to a [`SecurityProvider`].
#[derive(Clone)]
pub struct KeyMaterial {
    label: String,
    pem: String,
}

impl KeyMaterial {
    /// Check that `pem` holds a complete PEM block.
    pub fn from_pem(pem: &str) -> Result<Self, SoapError> {
        let label = pem
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix("-----BEGIN ")?.strip_suffix("-----"))
            .ok_or_else(|| SoapError::Config("no PEM BEGIN line found".to_string()))?
            .to_string();

        let end = format!("-----END {}-----", label);
        if !pem.lines().any(|line| line.trim() == end) {
            return Err(SoapError::Config(format!("PEM block '{}' is not terminated", label)));
        }

        Ok(Self {
            label,
            pem: pem.to_string(),
        })
    }

    /// Load and check a PEM file. Fails fast on a missing or malformed file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, SoapError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SoapError::Config(format!("cannot read key file {}: {}", path.display(), e))
        })?;
        Self::from_pem(&content)
            .map_err(|e| SoapError::Config(format!("{}: {}", path.display(), e)))
    }

    /// PEM label, e.g. `PRIVATE KEY` or `CERTIFICATE`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

struct UserToken {
    username: String,
    password: String,
    password_type: PasswordType,
}

/// Builder for [`WsseMiddleware`].
pub struct WsseBuilder {
    timestamp_ttl: Option<u64>,
    user_token: Option<UserToken>,
    provider: Option<Arc<dyn SecurityProvider>>,
    signing_key: Option<KeyMaterial>,
    encrypt: bool,
    must_understand: bool,
    verify_response_timestamp: bool,
    verify_response_signature: bool,
}

impl WsseBuilder {
    /// Add a timestamp valid for `ttl_secs` seconds (default 3600).
    pub fn with_timestamp(mut self, ttl_secs: u64) -> Self {
        self.timestamp_ttl = Some(ttl_secs);
        self
    }

    pub fn without_timestamp(mut self) -> Self {
        self.timestamp_ttl = None;
        self
    }

    pub fn with_user_token(mut self, username: &str, password: &str, password_type: PasswordType) -> Self {
        self.user_token = Some(UserToken {
            username: username.to_string(),
            password: password.to_string(),
            password_type,
        });
        self
    }

    /// Sign every outgoing envelope with `provider`.
    pub fn with_signature(mut self, provider: Arc<dyn SecurityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Key handed to the signature provider on every `sign` call. Load it with
    /// [`KeyMaterial::from_pem_file`] so a missing file fails before the
    /// middleware exists.
    pub fn with_signature_key(mut self, key: KeyMaterial) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Encrypt outgoing and decrypt incoming envelopes with the signature
    /// provider.
    pub fn with_encryption(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn must_understand(mut self, must_understand: bool) -> Self {
        self.must_understand = must_understand;
        self
    }

    /// Reject successful responses without a Security timestamp or with an
    /// expired one. Error responses are passed through unchecked.
    pub fn verify_response_timestamp(mut self, verify: bool) -> Self {
        self.verify_response_timestamp = verify;
        self
    }

    /// Verify response signatures with the signature provider.
    pub fn verify_response_signature(mut self, verify: bool) -> Self {
        self.verify_response_signature = verify;
        self
    }

    pub fn build(self) -> Result<WsseMiddleware, SoapError> {
        let timestamp_ttl = self
            .timestamp_ttl
            .map(|secs| {
                i64::try_from(secs)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .ok_or_else(|| SoapError::Config(format!("timestamp TTL {}s is out of range", secs)))
            })
            .transpose()?;

        if let Some(token) = &self.user_token {
            if token.username.is_empty() {
                return Err(SoapError::Config(
                    "username token requires a username".to_string(),
                ));
            }
        }

        if self.provider.is_none()
            && (self.encrypt || self.verify_response_signature || self.signing_key.is_some())
        {
            return Err(SoapError::Config(
                "signing keys, encryption and signature verification require a security provider"
                    .to_string(),
            ));
        }

        Ok(WsseMiddleware {
            timestamp_ttl,
            user_token: self.user_token,
            provider: self.provider,
            signing_key: self.signing_key,
            encrypt: self.encrypt,
            must_understand: self.must_understand,
            verify_response_timestamp: self.verify_response_timestamp,
            verify_response_signature: self.verify_response_signature,
        })
    }
}

/// Prepends a `wsse:Security` header to every outgoing envelope.
pub struct WsseMiddleware {
    timestamp_ttl: Option<TimeDelta>,
    user_token: Option<UserToken>,
    provider: Option<Arc<dyn SecurityProvider>>,
    signing_key: Option<KeyMaterial>,
    encrypt: bool,
    must_understand: bool,
    verify_response_timestamp: bool,
    verify_response_signature: bool,
}

impl WsseMiddleware {
    pub fn builder() -> WsseBuilder {
        WsseBuilder {
            timestamp_ttl: Some(3600),
            user_token: None,
            provider: None,
            signing_key: None,
            encrypt: false,
            must_understand: true,
            verify_response_timestamp: false,
            verify_response_signature: false,
        }
    }

    fn secure_request(&self, request: SoapRequest) -> Result<SoapRequest, SoapError> {
        let mut view = SoapXmlView::from_request(&request)?;
        let security = self.security_header(&view, Utc::now())?;
        view.prepend_soap_header(security)?;

        if let Some(provider) = &self.provider {
            provider.sign(&mut view, self.signing_key.as_ref())?;
            if self.encrypt {
                provider.encrypt(&mut view)?;
            }
        }

        debug!(
            timestamp = self.timestamp_ttl.is_some(),
            username_token = self.user_token.is_some(),
            signed = self.provider.is_some(),
            encrypted = self.encrypt,
            "Added WS-Security header"
        );
        view.into_request(request)
    }

    fn security_header(&self, view: &SoapXmlView, now: DateTime<Utc>) -> Result<Element, SoapError> {
        let mut security = element(WSSE_PREFIX, "Security", WSSE_NS);
        if let Some(namespaces) = security.namespaces.as_mut() {
            namespaces.put(WSU_PREFIX, WSU_NS);
        }

        if self.must_understand {
            let prefix = match &view.envelope().prefix {
                Some(prefix) => prefix.clone(),
                None => {
                    let prefix = "soapenv".to_string();
                    if let Some(namespaces) = security.namespaces.as_mut() {
                        namespaces.put(prefix.as_str(), view.envelope_namespace());
                    }
                    prefix
                }
            };
            let value = match view.soap_version() {
                SoapVersion::Soap11 => "1",
                SoapVersion::Soap12 => "true",
            };
            security
                .attributes
                .insert(format!("{}:mustUnderstand", prefix), value.to_string());
        }

        let created = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        if let Some(ttl) = self.timestamp_ttl {
            let expires = now
                .checked_add_signed(ttl)
                .ok_or_else(|| SoapError::WsSecurity("timestamp expiry overflows".to_string()))?
                .to_rfc3339_opts(SecondsFormat::Millis, true);

            let mut timestamp = element(WSU_PREFIX, "Timestamp", WSU_NS);
            timestamp
                .attributes
                .insert("wsu:Id".to_string(), format!("TS-{}", Uuid::new_v4()));
            timestamp.children.push(XMLNode::Element(text_element(
                WSU_PREFIX, "Created", WSU_NS, created.as_str(),
            )));
            timestamp.children.push(XMLNode::Element(text_element(
                WSU_PREFIX, "Expires", WSU_NS, expires,
            )));
            security.children.push(XMLNode::Element(timestamp));
        }

        if let Some(token) = &self.user_token {
            let nonce: [u8; 16] = rand::random();
            security
                .children
                .push(XMLNode::Element(username_token(token, &nonce, &created)));
        }

        Ok(security)
    }

    fn check_response(&self, response: SoapResponse) -> Result<SoapResponse, SoapError> {
        let mut view = SoapXmlView::from_response(&response)?;
        view.register_namespace(WSSE_PREFIX, WSSE_NS);
        view.register_namespace(WSU_PREFIX, WSU_NS);

        if self.encrypt {
            if let Some(provider) = &self.provider {
                provider.decrypt(&mut view)?;
            }
        }

        if self.verify_response_signature {
            if let Some(provider) = &self.provider {
                provider.verify(&view)?;
            }
        }

        if self.verify_response_timestamp {
            check_timestamp(&view, Utc::now())?;
        }

        if self.encrypt {
            view.into_response(response)
        } else {
            Ok(response)
        }
    }
}

#[async_trait]
impl Middleware for WsseMiddleware {
    fn name(&self) -> &str {
        "wsse"
    }

    async fn before_request(
        &self,
        request: SoapRequest,
        options: CallOptions,
        next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        let request = self.secure_request(request)?;
        next.run(request, options).await
    }

    fn after_response(&self, response: SoapResponse) -> Result<SoapResponse, SoapError> {
        if !(self.encrypt || self.verify_response_signature || self.verify_response_timestamp) {
            return Ok(response);
        }
        // Faults and gateway errors go back to the caller as they are
        if !response.status().is_success() {
            debug!(status = %response.status(), "Skipping WS-Security checks on error response");
            return Ok(response);
        }
        self.check_response(response)
    }
}

fn username_token(token: &UserToken, nonce: &[u8], created: &str) -> Element {
    let mut element_token = element(WSSE_PREFIX, "UsernameToken", WSSE_NS);
    element_token
        .attributes
        .insert("wsu:Id".to_string(), format!("UsernameToken-{}", Uuid::new_v4()));
    if let Some(namespaces) = element_token.namespaces.as_mut() {
        namespaces.put(WSU_PREFIX, WSU_NS);
    }

    element_token.children.push(XMLNode::Element(text_element(
        WSSE_PREFIX,
        "Username",
        WSSE_NS,
        token.username.as_str(),
    )));

    let password = match token.password_type {
        PasswordType::PasswordText => token.password.clone(),
        PasswordType::PasswordDigest => password_digest(nonce, created, &token.password),
    };
    let mut password_el = text_element(WSSE_PREFIX, "Password", WSSE_NS, password);
    password_el
        .attributes
        .insert("Type".to_string(), token.password_type.uri().to_string());
    element_token.children.push(XMLNode::Element(password_el));

    if token.password_type == PasswordType::PasswordDigest {
        let mut nonce_el = text_element(WSSE_PREFIX, "Nonce", WSSE_NS, STANDARD.encode(nonce));
        nonce_el
            .attributes
            .insert("EncodingType".to_string(), BASE64_ENCODING.to_string());
        element_token.children.push(XMLNode::Element(nonce_el));
        element_token.children.push(XMLNode::Element(text_element(
            WSU_PREFIX, "Created", WSU_NS, created,
        )));
    }

    element_token
}

/// Base64(SHA-1(nonce ++ created ++ password)).
pub(crate) fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn check_timestamp(view: &SoapXmlView, now: DateTime<Utc>) -> Result<(), SoapError> {
    let expires = view
        .xpath("/soap:Envelope/soap:Header/wsse:Security/wsu:Timestamp/wsu:Expires")?
        .first()
        .map(|el| text_of(el))
        .ok_or_else(|| {
            SoapError::WsSecurity("response has no Security timestamp".to_string())
        })?;

    let expires_time = DateTime::parse_from_rfc3339(expires.trim())
        .map_err(|e| SoapError::WsSecurity(format!("invalid Expires timestamp '{}': {}", expires, e)))?
        .with_timezone(&Utc);

    if now > expires_time {
        warn!(expires = %expires, "Response Security timestamp expired");
        return Err(SoapError::WsSecurity(format!(
            "response timestamp expired at {}",
            expires
        )));
    }

    Ok(())
}
