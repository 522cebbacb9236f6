//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    response::Json,
    routing::{post, put},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_shield::config::{Environment, ShieldConfig};
use api_shield::{initialize, HttpServer, Shutdown};

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const AUTH: &str = "Bearer test-user";

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub reload: mpsc::UnboundedSender<ShieldConfig>,
    shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config with a valid secret and the test environment.
pub fn test_config() -> ShieldConfig {
    let mut config = ShieldConfig::default();
    config.environment = Environment::Test;
    config.listener.bind_address = "127.0.0.1:0".into();
    config.csrf.secret = Some(SECRET.into());
    config.cors.origins = Some("https://app.example.com".into());
    config
}

/// Application routes the shield protects in tests.
pub fn test_app() -> Router {
    Router::new()
        .route("/api/echo", post(echo))
        .route("/api/items", put(echo))
}

async fn echo(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}

pub async fn spawn_server(config: ShieldConfig) -> TestServer {
    let state = initialize(&config).await.unwrap();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (reload, updates) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, state, test_app());
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, updates, rx).await.unwrap();
    });

    // Give the server a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        reload,
        shutdown,
    }
}

/// Client that identifies as an authenticated user.
pub fn authed_client() -> reqwest::Client {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_static(AUTH),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .unwrap()
}

#[allow(dead_code)]
pub async fn fetch_token(server: &TestServer) -> String {
    let body: Value = authed_client()
        .get(server.url("/api/csrf-token"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["token"].as_str().unwrap().to_string()
}
