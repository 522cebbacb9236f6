//! Per-client rate limiting for state-changing requests.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::http::middleware::is_state_changing;
use crate::http::response::{error_response, RATE_LIMITED};
use crate::http::{RequestIdExt, ShieldState};
use crate::observability::metrics;

/// Rate-limit key for a request: the peer IP, or "unknown" without connect info.
pub fn client_identifier(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<ShieldState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.limiter.as_ref() else {
        return next.run(request).await;
    };
    if !is_state_changing(request.method()) {
        return next.run(request).await;
    }

    let client = client_identifier(&request);
    if limiter.check_limit(&client).await {
        next.run(request).await
    } else {
        tracing::warn!(
            client = %client,
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request.request_id(),
            max_requests = limiter.settings().max_requests,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited();
        error_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED)
    }
}
