// crates/scaler-client/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Local HTTP test server, token minting, and a fake scaler API.
// Purpose: Provide reusable fixtures for scaler-client integration tests.
// Dependencies: hyper, hyper-util, http-body-util, tokio, serde_json, jsonwebtoken
// ============================================================================

//! ## Overview
//! [`TestHttpServer`] binds a loopback listener and answers every request with
//! a synchronous responder, optionally after a delay. [`fake_scaler`] builds a
//! responder that plays issuance, signing, upload, download, and cleanup.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::HeaderMap;
use hyper::Method;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use scaler_client::ApiKey;
use scaler_client::ScalerConfig;
use scaler_client::ScalerEvent;
use scaler_client::ScalerObserver;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

// ============================================================================
// SECTION: Captured Requests
// ============================================================================

/// Captured HTTP request data for assertions.
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    /// Request method.
    pub method: Method,
    /// Request path without query.
    pub path: String,
    /// Base URL of the server that received the request.
    pub base_url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw request body bytes.
    pub body: Bytes,
}

impl CapturedRequest {
    /// Parses the body as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is json")
    }

    /// Returns a header value as text.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
    }
}

// ============================================================================
// SECTION: Test Responses
// ============================================================================

/// Test response wrapper.
#[derive(Clone, Debug)]
pub struct TestResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Bytes,
    /// Delay applied before the response is sent.
    pub delay: Duration,
}

impl TestResponse {
    /// Builds a 200 JSON response with Content-Type set.
    pub fn json(value: &Value) -> Self {
        let body = serde_json::to_vec(value).expect("serialize json response");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(body),
            delay: Duration::ZERO,
        }
    }

    /// Builds a 200 binary response.
    pub fn bytes(body: impl Into<Bytes>) -> Self {
        Self::raw(StatusCode::OK, body)
    }

    /// Builds a response with a custom status and text body.
    pub fn raw(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// Delays the response by the given duration.
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl From<TestResponse> for Response<Full<Bytes>> {
    fn from(value: TestResponse) -> Self {
        let mut response = Response::new(Full::new(value.body));
        *response.status_mut() = value.status;
        *response.headers_mut() = value.headers;
        response
    }
}

// ============================================================================
// SECTION: Test Server
// ============================================================================

/// Shared responder callback.
type Responder = Arc<Mutex<Box<dyn FnMut(CapturedRequest) -> TestResponse + Send>>>;

/// Lightweight HTTP test server with request capture.
pub struct TestHttpServer {
    /// Bound loopback address.
    addr: SocketAddr,
    /// Requests in the order their responses were produced.
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    /// Shutdown signal for the accept loop.
    shutdown: Option<oneshot::Sender<()>>,
    /// Accept loop task.
    handle: JoinHandle<()>,
}

impl TestHttpServer {
    /// Starts the server with a responder callback.
    pub async fn start<F>(responder: F) -> Self
    where
        F: FnMut(CapturedRequest) -> TestResponse + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{addr}");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Responder = Arc::new(Mutex::new(Box::new(responder)));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let requests_task = Arc::clone(&requests);
        let responder_task = Arc::clone(&responder);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        break;
                    }
                    accept = listener.accept() => {
                        let Ok((stream, _)) = accept else { continue };
                        let requests = Arc::clone(&requests_task);
                        let responder = Arc::clone(&responder_task);
                        let base_url = base_url.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req: Request<Incoming>| {
                                let requests = Arc::clone(&requests);
                                let responder = Arc::clone(&responder);
                                let base_url = base_url.clone();
                                async move {
                                    let (parts, body) = req.into_parts();
                                    let bytes = body.collect().await?.to_bytes();
                                    let captured = CapturedRequest {
                                        method: parts.method,
                                        path: parts.uri.path().to_string(),
                                        base_url,
                                        headers: parts.headers,
                                        body: bytes,
                                    };
                                    let response = {
                                        let mut responder = responder.lock().await;
                                        let response = responder.as_mut()(captured.clone());
                                        requests.lock().await.push(captured);
                                        response
                                    };
                                    if !response.delay.is_zero() {
                                        tokio::time::sleep(response.delay).await;
                                    }
                                    let response: Response<Full<Bytes>> = response.into();
                                    Ok::<_, hyper::Error>(response)
                                }
                            });
                            let _ = http1::Builder::new().serve_connection(io, service).await;
                        });
                    }
                }
            }
        });

        Self {
            addr,
            requests,
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    /// Returns the base URL for the server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Returns a snapshot of captured requests.
    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }

    /// Returns captured requests for one path.
    pub async fn requests_to(&self, path: &str) -> Vec<CapturedRequest> {
        self.requests().await.into_iter().filter(|request| request.path == path).collect()
    }

    /// Returns the captured request paths in order.
    pub async fn paths(&self) -> Vec<String> {
        self.requests().await.into_iter().map(|request| request.path).collect()
    }

    /// Shuts down the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Mints an HS256 JWT with the given `exp` claim.
pub fn mint_token(exp_secs: u64) -> String {
    let claims = json!({"sub": "test", "exp": exp_secs});
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
    )
    .expect("encode token")
}

/// Mints a token expiring `offset` after now.
pub fn token_expiring_in(offset: Duration) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock after epoch");
    mint_token((now + offset).as_secs())
}

/// Mints a token that expired an hour ago.
pub fn expired_token() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock after epoch");
    mint_token(now.as_secs() - 3_600)
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// API key used by every test configuration.
pub const TEST_API_KEY: &str = "key-123";

/// Builds a configuration pointing at the test server.
pub fn test_config(server: &TestHttpServer) -> ScalerConfig {
    let mut config = ScalerConfig::new(ApiKey::new(TEST_API_KEY)).expect("default config");
    config.issuance_url = Url::parse(&format!("{}/auth", server.url())).expect("issuance url");
    config.sign_url = Url::parse(&format!("{}/sign", server.url())).expect("sign url");
    config.request_timeout = Duration::from_secs(10);
    config
}

// ============================================================================
// SECTION: Observers
// ============================================================================

/// Observer that keeps every event for assertions.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    /// Recorded events in order.
    events: Arc<std::sync::Mutex<Vec<ScalerEvent>>>,
}

impl RecordingObserver {
    /// Returns a snapshot of recorded events.
    pub fn events(&self) -> Vec<ScalerEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

impl ScalerObserver for RecordingObserver {
    fn record(&self, event: &ScalerEvent) {
        self.events.lock().expect("events lock").push(event.clone());
    }
}

// ============================================================================
// SECTION: Fake Scaler Service
// ============================================================================

/// One output the fake service produces.
#[derive(Clone, Debug)]
pub struct FakeOutput {
    /// Temporary file identifier.
    pub file_id: &'static str,
    /// Download response; `None` means delivered out of band.
    pub download: Option<TestResponse>,
    /// Fit object reported for this output.
    pub fit: Value,
}

impl FakeOutput {
    /// Output downloadable with the given bytes.
    pub fn bytes(file_id: &'static str, body: &'static [u8]) -> Self {
        Self {
            file_id,
            download: Some(TestResponse::bytes(body)),
            fit: default_fit(),
        }
    }

    /// Output with a custom download response.
    pub fn response(file_id: &'static str, response: TestResponse) -> Self {
        Self {
            file_id,
            download: Some(response),
            fit: default_fit(),
        }
    }

    /// Output delivered out of band.
    pub fn uploaded(file_id: &'static str) -> Self {
        Self {
            file_id,
            download: None,
            fit: default_fit(),
        }
    }

    /// Replaces the reported fit object.
    pub fn with_fit(mut self, fit: Value) -> Self {
        self.fit = fit;
        self
    }
}

/// Fit object reported when a test does not choose one.
fn default_fit() -> Value {
    json!({"width": 150, "height": 150})
}

/// Overrides for the fake service's control endpoints.
#[derive(Clone, Debug, Default)]
pub struct FakeOverrides {
    /// Replaces the signing response.
    pub sign: Option<TestResponse>,
    /// Replaces the upload response.
    pub upload: Option<TestResponse>,
    /// Replaces the cleanup response.
    pub delete: Option<TestResponse>,
    /// Server-reported upload time in milliseconds.
    pub upload_images_ms: Option<f64>,
}

/// Builds a responder that plays the full remote protocol.
pub fn fake_scaler(
    outputs: Vec<FakeOutput>,
    overrides: FakeOverrides,
) -> impl FnMut(CapturedRequest) -> TestResponse + Send + 'static {
    move |request: CapturedRequest| {
        let base = request.base_url.clone();
        match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/auth") => TestResponse::json(&json!({
                "accessToken": token_expiring_in(Duration::from_secs(3_600))
            })),
            ("POST", "/sign") => overrides
                .sign
                .clone()
                .unwrap_or_else(|| TestResponse::json(&json!({"url": format!("{base}/upload")}))),
            ("POST", "/upload") => overrides
                .upload
                .clone()
                .unwrap_or_else(|| upload_response(&base, &outputs, overrides.upload_images_ms)),
            ("DELETE", "/delete") => overrides
                .delete
                .clone()
                .unwrap_or_else(|| TestResponse::json(&json!({}))),
            ("GET", path) => path
                .strip_prefix("/dl/")
                .and_then(|id| outputs.iter().find(|output| output.file_id == id))
                .and_then(|output| output.download.clone())
                .unwrap_or_else(|| TestResponse::raw(StatusCode::NOT_FOUND, "missing")),
            _ => TestResponse::raw(StatusCode::NOT_FOUND, "unknown route"),
        }
    }
}

/// Builds the transform response listing every fake output.
pub fn upload_response(
    base: &str,
    outputs: &[FakeOutput],
    upload_images_ms: Option<f64>,
) -> TestResponse {
    let images: Vec<Value> = outputs
        .iter()
        .map(|output| {
            let download_url = if output.download.is_some() {
                format!("{base}/dl/{}", output.file_id)
            } else {
                String::new()
            };
            json!({
                "downloadUrl": download_url,
                "fileId": output.file_id,
                "fit": output.fit,
                "pixelSize": {"width": 150, "height": 100}
            })
        })
        .collect();
    let mut time_stats = json!({"transformMs": 5.0});
    if let Some(ms) = upload_images_ms {
        time_stats["uploadImagesMs"] = json!(ms);
    }
    TestResponse::json(&json!({
        "inputImage": {"pixelSize": {"width": 800, "height": 533}},
        "outputImages": images,
        "deleteUrl": format!("{base}/delete"),
        "timeStats": time_stats
    }))
}
