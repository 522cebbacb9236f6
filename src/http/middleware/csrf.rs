//! CSRF verification for state-changing requests.
//!
//! Missing or invalid tokens get a 403 so the client can refresh its token
//! and retry once.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::http::middleware::is_state_changing;
use crate::http::response::{error_response, INVALID_CSRF_TOKEN};
use crate::http::{RequestIdExt, ShieldState};
use crate::observability::metrics;

pub async fn csrf_middleware(
    State(state): State<ShieldState>,
    request: Request,
    next: Next,
) -> Response {
    if !is_state_changing(request.method()) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(&state.csrf_header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let token_present = token.is_some();
    let valid = match token {
        Some(token) => state.csrf.validate_default(token),
        None => {
            metrics::record_csrf_rejection("missing");
            false
        }
    };

    if valid {
        return next.run(request).await;
    }

    tracing::warn!(
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request.request_id(),
        token_present,
        "CSRF check failed"
    );
    error_response(StatusCode::FORBIDDEN, INVALID_CSRF_TOKEN)
}
