//! End-to-end rate limiting.

use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;
use common::{authed_client, fetch_token, spawn_server, test_config};

#[tokio::test]
async fn test_state_changing_requests_are_limited() {
    let mut config = test_config();
    config.rate_limit.max_requests = 3;
    let server = spawn_server(config).await;
    let token = fetch_token(&server).await;
    let client = authed_client();

    for i in 0..3 {
        let resp = client
            .post(server.url("/api/echo"))
            .header("x-csrf-token", &token)
            .json(&json!({ "i": i }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "request {i} should pass");
    }

    let resp = client
        .post(server.url("/api/echo"))
        .header("x-csrf-token", &token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("x-frame-options"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate_limited");
}

#[tokio::test]
async fn test_rejected_csrf_requests_still_count() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let server = spawn_server(config).await;
    let client = authed_client();

    for _ in 0..2 {
        let resp = client.post(server.url("/api/echo")).json(&json!({})).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
    let resp = client.post(server.url("/api/echo")).json(&json!({})).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_safe_methods_are_not_limited() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let server = spawn_server(config).await;

    for _ in 0..5 {
        let resp = reqwest::get(server.url("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_disabled_limiter_lets_everything_through() {
    let mut config = test_config();
    config.rate_limit.enabled = false;
    config.rate_limit.max_requests = 1;
    let server = spawn_server(config).await;
    let token = fetch_token(&server).await;
    let client = authed_client();

    for _ in 0..3 {
        let resp = client
            .post(server.url("/api/echo"))
            .header("x-csrf-token", &token)
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
