//! Response helpers.
//!
//! Rejections are small JSON bodies so callers can tell a CSRF failure (403)
//! apart from other authorization failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

/// Body of every rejection issued by the shield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub const INVALID_CSRF_TOKEN: &str = "invalid_csrf_token";
pub const RATE_LIMITED: &str = "rate_limited";
pub const INTERNAL_ERROR: &str = "internal_error";

pub fn error_response(status: StatusCode, code: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: code.to_string(),
        }),
    )
        .into_response()
}
