#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use clap::Parser;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use native_push_server::adapters::push::AdapterSet;
use native_push_server::adapters::push::web_push::WebPushAdapter;
use native_push_server::config::{Config, PushConfig};
use native_push_server::domain::owner::OwnerId;
use native_push_server::services::token_store::TokenStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use web_push::VapidSignatureBuilder;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("native_push_server=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("rustls=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Public and private VAPID keys, base64url.
pub fn vapid_keys() -> (String, String) {
    let keys = std::fs::read_to_string(fixture("vapid_keys.txt")).unwrap();
    let mut lines = keys.lines();
    (lines.next().unwrap().trim().to_string(), lines.next().unwrap().trim().to_string())
}

/// A WebPush adapter signing with the fixture VAPID key.
pub fn web_push_adapter() -> WebPushAdapter {
    let pem = std::fs::read(fixture("vapid_private.pem")).unwrap();
    let signer = VapidSignatureBuilder::from_pem_no_sub(pem.as_slice()).unwrap();
    WebPushAdapter::new(reqwest::Client::new(), signer, "mailto:ops@example.com")
}

/// A well-formed subscription token pointing at `endpoint`.
pub fn subscription(endpoint: &str) -> String {
    let (public_key, _) = vapid_keys();
    serde_json::json!({ "endpoint": endpoint, "p256dh": public_key, "auth": URL_SAFE_NO_PAD.encode([9u8; 16]) })
        .to_string()
}

pub fn get_test_config() -> Config {
    Config::try_parse_from(["native-push-server", "--store", "memory", "--request-timeout-secs", "2"])
        .unwrap()
}

pub fn get_push_config() -> PushConfig {
    get_test_config().push
}

pub struct TestApp {
    pub server_url: String,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn<Id: OwnerId>(adapters: AdapterSet) -> Self {
        Self::spawn_with(native_push_server::AppBuilder::<Id>::new(get_push_config()).with_adapters(adapters)).await
    }

    pub async fn spawn_with_store<Id: OwnerId>(store: Arc<dyn TokenStore<Id>>, adapters: AdapterSet) -> Self {
        Self::spawn_with(
            native_push_server::AppBuilder::<Id>::new(get_push_config()).with_store(store).with_adapters(adapters),
        )
        .await
    }

    async fn spawn_with<Id: OwnerId>(builder: native_push_server::AppBuilder<Id>) -> Self {
        setup_tracing();
        let router = builder.build();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { server_url: format!("http://{addr}"), client: reqwest::Client::new() }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Default)]
struct MockState {
    responses: HashMap<String, (u16, String)>,
    requests: Mutex<Vec<CapturedRequest>>,
}

/// A stand-in for a provider endpoint that records every request it receives.
/// Paths without a configured response get `200` with an empty body.
pub struct MockServer {
    pub url: String,
    state: Arc<MockState>,
}

async fn capture(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(CapturedRequest { method, path: path.clone(), headers, body });
    let (status, body) = state.responses.get(&path).cloned().unwrap_or((200, String::new()));
    (StatusCode::from_u16(status).unwrap(), body)
}

impl MockServer {
    pub async fn spawn(responses: &[(&str, u16, &str)]) -> Self {
        setup_tracing();
        let state = Arc::new(MockState {
            responses: responses.iter().map(|(path, status, body)| ((*path).to_string(), (*status, (*body).to_string()))).collect(),
            requests: Mutex::new(Vec::new()),
        });
        let router = axum::Router::new().fallback(capture).with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { url: format!("http://{addr}"), state }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<CapturedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}
