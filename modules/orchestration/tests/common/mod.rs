#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get as get_route, post},
    Json, Router,
};
use blob_storage::{BlobStore, InMemoryBlobStore};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use orchestration_rs::{
    attachments::AttachmentResolver,
    gateways::{hosted_checkout, vault, ContinuationCodec, HostedCheckoutConfig, VaultConfig},
    ledger::{InMemoryLedger, Ledger},
    routes,
    scraper::ScraperClient,
    services::{AdmissionService, DispatchService},
    sink::{DispatchSink, HttpDispatchSink},
    AppState, Gateways,
};

pub const BUCKET: &str = "documents";
pub const FRONTEND_URL: &str = "https://app.example.com";
pub const PUBLIC_BASE_URL: &str = "http://orchestration.test";
pub const SETUP_TOKEN_ID: &str = "setup-tok-1";
pub const PAYMENT_TOKEN_ID: &str = "pay-tok-1";
pub const ORDER_ID: &str = "order-1";
pub const CAPTURE_ID: &str = "capture-1";

/// Serve a router on an ephemeral local port and return its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{}", addr)
}

// ============================================================================
// Mock payment providers
// ============================================================================

/// Stand-in for both payment providers; records every request it receives
#[derive(Clone, Default)]
pub struct MockProvider {
    calls: Arc<Mutex<Vec<String>>>,
    pub fail_capture: Arc<AtomicBool>,
    pub fail_payment_token: Arc<AtomicBool>,
    pub void_orders: Arc<AtomicBool>,
    pub fail_order_lookup: Arc<AtomicBool>,
}

impl MockProvider {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/login", post(login))
            .route("/v1/oauth2/token", post(oauth_token))
            .route("/v3/vault/setup-tokens", post(setup_token))
            .route("/v3/vault/payment-tokens", post(payment_token))
            .route("/v2/checkout/orders", post(create_order))
            .route("/v2/checkout/orders/{order_id}", get_route(get_order))
            .route("/v2/checkout/orders/{order_id}/capture", post(capture_order))
            .with_state(self.clone());
        serve(router).await
    }
}

fn completed_order(order_id: &str) -> JsonValue {
    json!({
        "id": order_id,
        "status": "COMPLETED",
        "purchase_units": [{
            "payments": { "captures": [{ "id": CAPTURE_ID, "status": "COMPLETED" }] }
        }]
    })
}

async fn login(State(mock): State<MockProvider>, Json(body): Json<JsonValue>) -> Response {
    mock.record("POST /login".to_string());
    if body["username"] != "merchant" || body["password"] != "secret" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad credentials"})))
            .into_response();
    }
    Json(json!({ "token": "session-token-1" })).into_response()
}

async fn oauth_token(State(mock): State<MockProvider>) -> Json<JsonValue> {
    mock.record("POST /v1/oauth2/token".to_string());
    Json(json!({ "access_token": "access-1", "expires_in": 3600 }))
}

async fn setup_token(State(mock): State<MockProvider>, headers: HeaderMap) -> Json<JsonValue> {
    let request_id = headers
        .get("PayPal-Request-Id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    mock.record(format!("POST /v3/vault/setup-tokens {}", request_id));
    Json(json!({
        "id": SETUP_TOKEN_ID,
        "status": "PAYER_ACTION_REQUIRED",
        "links": [
            { "href": "https://provider.test/approve/setup-tok-1", "rel": "approve", "method": "GET" }
        ]
    }))
}

async fn payment_token(State(mock): State<MockProvider>) -> Response {
    mock.record("POST /v3/vault/payment-tokens".to_string());
    if mock.fail_payment_token.load(Ordering::SeqCst) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"name": "UNPROCESSABLE_ENTITY", "details": [{"issue": "TOKEN_EXPIRED"}]})),
        )
            .into_response();
    }
    Json(json!({ "id": PAYMENT_TOKEN_ID, "customer": { "id": "customer-1" } })).into_response()
}

async fn create_order(State(mock): State<MockProvider>, Json(body): Json<JsonValue>) -> Json<JsonValue> {
    mock.record(format!(
        "POST /v2/checkout/orders {}",
        body["purchase_units"][0]["amount"]["value"].as_str().unwrap_or_default()
    ));
    Json(json!({ "id": ORDER_ID, "status": "CREATED" }))
}

async fn capture_order(State(mock): State<MockProvider>, Path(order_id): Path<String>) -> Response {
    mock.record(format!("POST /v2/checkout/orders/{}/capture", order_id));
    if mock.fail_capture.load(Ordering::SeqCst) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"name": "UNPROCESSABLE_ENTITY", "details": [{"issue": "INSTRUMENT_DECLINED"}]})),
        )
            .into_response();
    }
    Json(completed_order(&order_id)).into_response()
}

async fn get_order(State(mock): State<MockProvider>, Path(order_id): Path<String>) -> Response {
    mock.record(format!("GET /v2/checkout/orders/{}", order_id));
    if mock.fail_order_lookup.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"name": "SERVICE_UNAVAILABLE"})))
            .into_response();
    }
    if mock.void_orders.load(Ordering::SeqCst) {
        return Json(json!({ "id": order_id, "status": "VOIDED" })).into_response();
    }
    Json(completed_order(&order_id)).into_response()
}

// ============================================================================
// Mock scraper and dispatch sink
// ============================================================================

#[derive(Clone, Default)]
pub struct MockScraper {
    pub received: Arc<Mutex<Vec<JsonValue>>>,
    pub fail: Arc<AtomicBool>,
}

impl MockScraper {
    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/campaigns", post(scrape))
            .with_state(self.clone());
        format!("{}/campaigns", serve(router).await)
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

async fn scrape(State(mock): State<MockScraper>, Json(body): Json<JsonValue>) -> StatusCode {
    mock.received.lock().unwrap().push(body);
    if mock.fail.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::ACCEPTED
    }
}

/// A multipart request as the sink received it
#[derive(Debug, Clone)]
pub struct SinkRequest {
    pub content_type: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct MockSink {
    pub received: Arc<Mutex<Vec<SinkRequest>>>,
    pub calls: Arc<AtomicUsize>,
    pub reject: Arc<AtomicBool>,
}

impl MockSink {
    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/send", post(sink_send))
            .with_state(self.clone());
        format!("{}/send", serve(router).await)
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<SinkRequest> {
        self.received.lock().unwrap().last().cloned()
    }
}

async fn sink_send(State(mock): State<MockSink>, headers: HeaderMap, body: Bytes) -> Response {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    mock.received.lock().unwrap().push(SinkRequest {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    if mock.reject.load(Ordering::SeqCst) {
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "quota exceeded"})))
            .into_response();
    }
    Json(json!({"queued": true})).into_response()
}

// ============================================================================
// Application under test
// ============================================================================

#[derive(Default)]
pub struct AppOptions {
    pub gateway_a_url: Option<String>,
    pub gateway_b_url: Option<String>,
    pub signing_secret: Option<String>,
    pub scraper_url: Option<String>,
    pub sink_url: Option<String>,
}

pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<InMemoryLedger>,
    pub blobs: InMemoryBlobStore,
}

pub fn app(options: AppOptions) -> TestApp {
    let ledger = Arc::new(InMemoryLedger::new());
    let shared: Arc<dyn Ledger> = ledger.clone();

    let hosted = options.gateway_a_url.map(|base_url| HostedCheckoutConfig {
        base_url,
        username: "merchant".to_string(),
        password: "secret".to_string(),
        callback_url: format!("{}{}", PUBLIC_BASE_URL, hosted_checkout::CALLBACK_PATH),
    });
    let vault = options.gateway_b_url.map(|base_url| VaultConfig {
        base_url,
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        callback_url: format!("{}{}", PUBLIC_BASE_URL, vault::CALLBACK_PATH),
        brand_name: Some("Job Pilot".to_string()),
    });
    let codec = ContinuationCodec::from_secret(options.signing_secret.as_deref());
    let payments = Gateways::build(hosted, vault, codec, shared.clone()).into_service(shared.clone());

    let scraper = options
        .scraper_url
        .map(|url| ScraperClient::new(url).expect("scraper client"));
    let admission = AdmissionService::new(shared.clone(), scraper);

    let blobs = InMemoryBlobStore::new();
    let store: Arc<dyn BlobStore> = Arc::new(blobs.clone());
    let resolver = AttachmentResolver::new(store, BUCKET).expect("attachment resolver");
    let sink = options.sink_url.map(|url| {
        Arc::new(HttpDispatchSink::new(url).expect("sink client")) as Arc<dyn DispatchSink>
    });
    let dispatch = DispatchService::new(resolver, sink);

    let state = AppState::new(shared, payments, admission, dispatch, FRONTEND_URL);

    TestApp {
        router: routes::router(state),
        ledger,
        blobs,
    }
}

// ============================================================================
// Request helpers
// ============================================================================

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(router: &Router, uri: &str, body: JsonValue) -> Response {
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
    )
    .await
}

pub async fn get(router: &Router, uri: &str) -> Response {
    send(
        router,
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn body_json(response: Response) -> JsonValue {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Decimal from a JSON string or number
pub fn decimal(value: &JsonValue) -> Decimal {
    match value {
        JsonValue::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

pub fn initiate_body(provider: &str, user_id: &str, amount: &str) -> JsonValue {
    json!({
        "provider": provider,
        "user_id": user_id,
        "amount": amount,
        "plan": "gold",
        "currency": "USD",
        "billing": {
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@example.com"
        }
    })
}
