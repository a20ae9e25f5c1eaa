//! Integration tests for the soap-middleware crate.
//!
//! These tests exercise the public API surface end-to-end: clients and
//! chains built in code or from YAML, the built-in middlewares working
//! together, and WSDL retrieval through its own chain. The transport is an
//! in-memory handler so no network is involved.

use async_trait::async_trait;
use http::header::HeaderName;
use http::StatusCode;
use soap_middleware::config::ClientConfig;
use soap_middleware::xml::{child_elements, text_of, WSA_NS, WSSE_NS, WSU_NS};
use soap_middleware::{
    handler_fn, BasicAuthMiddleware, CallOptions, ClientBuilder, Handler, HttpTransport,
    HttpWsdlProvider, Middleware, MiddlewareChain, Next, RemoveEmptyNodesMiddleware, SoapClient, SoapError, SoapRequest,
    SoapResponse, SoapXmlView, WsaMiddleware, WsdlProvider, WsseMiddleware,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ENDPOINT: &str = "http://example.org/orders";

const ORDER_ENVELOPE: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header>
    <t:Trace xmlns:t="urn:trace">req-1</t:Trace>
  </soap:Header>
  <soap:Body>
    <m:PlaceOrder xmlns:m="urn:orders">
      <m:Item>widget</m:Item>
      <m:Coupon/>
    </m:PlaceOrder>
  </soap:Body>
</soap:Envelope>"#;

const OK_RESPONSE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><m:PlaceOrderResponse xmlns:m="urn:orders">ok</m:PlaceOrderResponse></soap:Body></soap:Envelope>"#;

// ============================================================================
// Helpers: recording middleware and in-memory transports
// ============================================================================

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: String,
    log: Log,
}

impl Recorder {
    fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Middleware for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn before_request(
        &self,
        request: SoapRequest,
        options: CallOptions,
        next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        self.log.lock().unwrap().push(format!("before:{}", self.name));
        next.run(request, options).await
    }

    fn after_response(&self, response: SoapResponse) -> Result<SoapResponse, SoapError> {
        self.log.lock().unwrap().push(format!("after:{}", self.name));
        Ok(response)
    }
}

/// Transport that stores every request it sees and answers with `OK_RESPONSE`.
fn capturing_transport(seen: &Arc<Mutex<Vec<SoapRequest>>>, log: &Log) -> impl Handler {
    let seen = seen.clone();
    let log = log.clone();
    handler_fn(move |request: SoapRequest, _opts: CallOptions| {
        seen.lock().unwrap().push(request);
        log.lock().unwrap().push("transport".to_string());
        async { Ok(SoapResponse::new(StatusCode::OK, OK_RESPONSE)) }
    })
}

fn view_with_prefixes(request: &SoapRequest) -> SoapXmlView {
    let mut view = SoapXmlView::from_request(request).unwrap();
    view.register_namespace("wsa", WSA_NS);
    view.register_namespace("wsse", WSSE_NS);
    view.register_namespace("wsu", WSU_NS);
    view.register_namespace("m", "urn:orders");
    view
}

// ============================================================================
// End-to-end: ordering through a client
// ============================================================================

#[tokio::test]
async fn test_hooks_run_in_onion_order() {
    let log: Log = Arc::default();
    let seen = Arc::default();

    let client = SoapClient::builder(capturing_transport(&seen, &log), ENDPOINT)
        .add_middleware(Recorder::new("outer", &log))
        .unwrap()
        .add_middleware(Recorder::new("middle", &log))
        .unwrap()
        .add_middleware(Recorder::new("inner", &log))
        .unwrap()
        .build();

    let response = client.call("urn:PlaceOrder", ORDER_ENVELOPE).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "before:outer",
            "before:middle",
            "before:inner",
            "transport",
            "after:inner",
            "after:middle",
            "after:outer",
        ]
    );
}

// ============================================================================
// End-to-end: short-circuit and error handling
// ============================================================================

/// Answers every call from memory without touching the transport.
struct CannedResponse;

#[async_trait]
impl Middleware for CannedResponse {
    fn name(&self) -> &str {
        "canned"
    }

    async fn before_request(
        &self,
        _request: SoapRequest,
        _options: CallOptions,
        _next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        Ok(SoapResponse::new(StatusCode::OK, OK_RESPONSE))
    }

    fn after_response(&self, response: SoapResponse) -> Result<SoapResponse, SoapError> {
        response.with_header(HeaderName::from_static("x-canned"), "1")
    }
}

#[tokio::test]
async fn test_short_circuit_skips_inner_layers_and_transport() {
    let log: Log = Arc::default();
    let seen: Arc<Mutex<Vec<SoapRequest>>> = Arc::default();

    let client = SoapClient::builder(capturing_transport(&seen, &log), ENDPOINT)
        .add_middleware(Recorder::new("outer", &log))
        .unwrap()
        .add_middleware(CannedResponse)
        .unwrap()
        .add_middleware(Recorder::new("inner", &log))
        .unwrap()
        .build();

    let response = client.call("urn:PlaceOrder", ORDER_ENVELOPE).await.unwrap();
    assert_eq!(response.header("x-canned"), Some("1"));
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(*log.lock().unwrap(), vec!["before:outer", "after:outer"]);
}

/// Turns transport failures into a SOAP fault response.
struct FaultOnTransportError;

#[async_trait]
impl Middleware for FaultOnTransportError {
    fn name(&self) -> &str {
        "fault_on_transport_error"
    }

    async fn before_request(
        &self,
        request: SoapRequest,
        options: CallOptions,
        next: Next<'_>,
    ) -> Result<SoapResponse, SoapError> {
        match next.run(request, options).await {
            Err(SoapError::Transport(msg)) => Ok(SoapResponse::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!(
                    r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>{}</faultstring></soap:Fault></soap:Body></soap:Envelope>"#,
                    msg
                ),
            )),
            other => other,
        }
    }
}

#[tokio::test]
async fn test_errors_propagate_and_can_be_recovered() {
    let log: Log = Arc::default();
    let failing = handler_fn(|_req: SoapRequest, _opts: CallOptions| async {
        Err(SoapError::Transport("connection refused".to_string()))
    });

    let mut chain = MiddlewareChain::new();
    chain.add(Recorder::new("outer", &log)).unwrap();
    chain.add(FaultOnTransportError).unwrap();
    chain.add(Recorder::new("inner", &log)).unwrap();

    let request = SoapRequest::soap(
        soap_middleware::SoapVersion::Soap11,
        ENDPOINT,
        "urn:PlaceOrder",
        ORDER_ENVELOPE,
    )
    .unwrap();
    let response = chain
        .run(&failing, request.clone(), CallOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let view = SoapXmlView::from_response(&response).unwrap();
    let fault = view.xpath("/soap:Envelope/soap:Body/soap:Fault/*").unwrap();
    let faultstring = fault.iter().find(|e| e.name == "faultstring").unwrap();
    assert_eq!(text_of(faultstring), "connection refused");

    // The inner layer never saw a response; the outer one saw the fault
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before:outer", "before:inner", "after:outer"]
    );

    // Without the recovering layer the error reaches the caller unchanged
    chain.remove("fault_on_transport_error").unwrap();
    let err = chain
        .run(&failing, request, CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SoapError::Transport(msg) if msg == "connection refused"));
}

// ============================================================================
// End-to-end: built-in middlewares together
// ============================================================================

#[tokio::test]
async fn test_security_addressing_and_cleanup_together() {
    let log: Log = Arc::default();
    let seen: Arc<Mutex<Vec<SoapRequest>>> = Arc::default();

    let client = SoapClient::builder(capturing_transport(&seen, &log), ENDPOINT)
        .add_middleware(BasicAuthMiddleware::new("svc", "pw"))
        .unwrap()
        .add_middleware(RemoveEmptyNodesMiddleware::new())
        .unwrap()
        .add_middleware(WsaMiddleware::new())
        .unwrap()
        .add_middleware(
            WsseMiddleware::builder()
                .with_timestamp(300)
                .with_user_token(
                    "alice",
                    "secret",
                    soap_middleware::config::PasswordType::PasswordDigest,
                )
                .build()
                .unwrap(),
        )
        .unwrap()
        .build();

    client.call("urn:PlaceOrder", ORDER_ENVELOPE).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let sent = &seen[0];
    assert!(sent.header("authorization").unwrap().starts_with("Basic "));

    let view = view_with_prefixes(sent);
    let header_names: Vec<_> = child_elements(view.header().unwrap())
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(
        header_names,
        vec!["Security", "Action", "To", "MessageID", "ReplyTo", "Trace"]
    );

    assert_eq!(text_of(view.xpath("//wsa:Action").unwrap()[0]), "urn:PlaceOrder");
    assert_eq!(text_of(view.xpath("//wsa:To").unwrap()[0]), ENDPOINT);
    assert_eq!(
        text_of(view.xpath("//wsse:Security/wsse:UsernameToken/wsse:Username").unwrap()[0]),
        "alice"
    );
    assert_eq!(view.xpath("//wsse:Security/wsu:Timestamp").unwrap().len(), 1);

    let order = view.xpath("/soap:Envelope/soap:Body/m:PlaceOrder/*").unwrap();
    let names: Vec<_> = order.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Item"]);
}

#[tokio::test]
async fn test_rewrites_keep_prefixed_attributes_on_the_wire() {
    let envelope = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <soap:Body>
    <m:Adjust xmlns:m="urn:orders"><m:Count xsi:type="xsd:int">1</m:Count><m:Empty xsi:nil="true"/></m:Adjust>
  </soap:Body>
</soap:Envelope>"#;

    let log: Log = Arc::default();
    let seen: Arc<Mutex<Vec<SoapRequest>>> = Arc::default();

    // Security first, so its header is re-read and re-written by WS-Addressing
    let client = SoapClient::builder(capturing_transport(&seen, &log), ENDPOINT)
        .add_middleware(WsseMiddleware::builder().build().unwrap())
        .unwrap()
        .add_middleware(WsaMiddleware::new())
        .unwrap()
        .build();
    client.call("urn:Adjust", envelope).await.unwrap();

    let seen = seen.lock().unwrap();
    let wire = std::str::from_utf8(seen[0].body()).unwrap();
    assert!(wire.contains(r#"xsi:type="xsd:int""#), "xsi:type lost: {}", wire);
    assert!(wire.contains(r#"xsi:nil="true""#), "xsi:nil lost: {}", wire);
    assert!(wire.contains(r#"soap:mustUnderstand="1""#), "mustUnderstand lost: {}", wire);
    assert!(wire.contains(r#"wsu:Id="TS-"#), "wsu:Id lost: {}", wire);

    let view = view_with_prefixes(&seen[0]);
    let security = view.xpath("//wsse:Security").unwrap()[0];
    assert_eq!(
        security.attributes.get("soap:mustUnderstand").map(String::as_str),
        Some("1")
    );
}

// ============================================================================
// End-to-end: YAML configuration
// ============================================================================

#[tokio::test]
async fn test_client_from_yaml_config() {
    let yaml = r#"
endpoint: "http://example.org/orders"
soap_version: "1.2"
timeout_secs: 15
middlewares:
  - type: basic_auth
    username: "svc"
    password: "pw"
  - type: ws_addressing
    reply_to: "http://client.example.org/replies"
  - type: wsse
    must_understand: false
    username_token:
      username: "alice"
      password: "secret"
      password_type: PasswordText
"#;
    let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();

    let seen: Arc<Mutex<Vec<(SoapRequest, CallOptions)>>> = Arc::default();
    let recorded = seen.clone();
    let transport = handler_fn(move |request: SoapRequest, options: CallOptions| {
        recorded.lock().unwrap().push((request, options));
        async { Ok(SoapResponse::new(StatusCode::OK, OK_RESPONSE)) }
    });

    let client = soap_middleware::ClientBuilder::from_config(transport, &config)
        .unwrap()
        .build();
    assert_eq!(client.middleware_names(), vec!["basic_auth", "wsa", "wsse"]);

    let envelope = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body><m:Ping xmlns:m="urn:orders">1</m:Ping></env:Body></env:Envelope>"#;
    client.call("urn:Ping", envelope).await.unwrap();

    let seen = seen.lock().unwrap();
    let (request, options) = &seen[0];
    assert_eq!(options.timeout, Some(std::time::Duration::from_secs(15)));
    assert!(request
        .header("content-type")
        .unwrap()
        .starts_with("application/soap+xml"));

    let view = view_with_prefixes(request);
    assert_eq!(
        text_of(view.xpath("//wsa:ReplyTo/wsa:Address").unwrap()[0]),
        "http://client.example.org/replies"
    );
    assert_eq!(text_of(view.xpath("//wsse:Password").unwrap()[0]), "secret");
}

#[tokio::test]
async fn test_ntlm_config_fails_on_http_transport() {
    let config: ClientConfig = serde_yaml::from_str(
        r#"
endpoint: "http://127.0.0.1:9/orders"
middlewares:
  - type: ntlm
    username: "alice"
    password: "secret"
    domain: "CORP"
"#,
    )
    .unwrap();

    let client = ClientBuilder::from_config(HttpTransport::new().unwrap(), &config)
        .unwrap()
        .build();
    let err = client.call("urn:PlaceOrder", ORDER_ENVELOPE).await.unwrap_err();
    assert!(matches!(err, SoapError::Transport(msg) if msg.contains("NTLM")));
}

#[test]
fn test_config_with_duplicate_middleware_is_rejected() {
    let yaml = r#"
endpoint: "http://example.org/orders"
middlewares:
  - type: remove_empty_nodes
  - type: remove_empty_nodes
"#;
    let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
    let err = config.build_chain().unwrap_err();
    assert!(matches!(err, SoapError::DuplicateMiddleware(name) if name == "remove_empty_nodes"));
}

// ============================================================================
// End-to-end: WSDL retrieval uses its own chain
// ============================================================================

#[tokio::test]
async fn test_wsdl_chain_is_separate_from_call_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let transport = Arc::new(handler_fn(move |request: SoapRequest, _opts: CallOptions| {
        counter.fetch_add(1, Ordering::SeqCst);
        let has_auth = request.header("authorization").is_some();
        async move {
            assert!(!has_auth, "WSDL fetch must not carry call-chain credentials");
            Ok(SoapResponse::new(
                StatusCode::OK,
                r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/" xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/"><binding name="B"><x:Ext xmlns:x="urn:x" wsdl:required="true"/></binding></definitions>"#,
            ))
        }
    }));

    let config: ClientConfig = serde_yaml::from_str(
        r#"
endpoint: "http://example.org/orders"
middlewares:
  - type: basic_auth
    username: "svc"
    password: "pw"
"#,
    )
    .unwrap();

    let provider = HttpWsdlProvider::new(transport.clone())
        .with_chain(config.wsdl.build_chain().unwrap());
    let location = config.wsdl_location().unwrap();
    assert_eq!(location, "http://example.org/orders?wsdl");

    let wsdl = provider.provide(&location).await.unwrap();
    let wsdl = std::str::from_utf8(&wsdl).unwrap();
    assert!(wsdl.contains(r#"wsdl:required="false""#));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
