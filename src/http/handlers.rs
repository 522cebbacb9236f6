//! Built-in endpoints.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::http::response::{error_response, INTERNAL_ERROR};
use crate::http::ShieldState;

/// Body of `GET /api/csrf-token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfTokenResponse {
    pub authenticated: bool,
    pub token: Option<String>,
}

pub async fn health() -> &'static str {
    "OK"
}

/// Issue a token to authenticated callers; anonymous callers get `null`.
pub async fn csrf_token(State(state): State<ShieldState>, headers: HeaderMap) -> Response {
    let authenticated = headers
        .get(&state.identity_header)
        .map(|v| !v.as_bytes().is_empty())
        .unwrap_or(false);

    let token = if authenticated {
        match state.csrf.generate() {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::error!(error = %e, "Failed to generate CSRF token");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
            }
        }
    } else {
        None
    };
    tracing::debug!(authenticated, "CSRF token requested");

    Json(CsrfTokenResponse {
        authenticated,
        token,
    })
    .into_response()
}
