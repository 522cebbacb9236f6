//! Request-security middleware.
//!
//! Applied outermost first: security headers, CORS (tower-http), then for
//! state-changing methods rate limiting and CSRF verification.

pub mod csrf;
pub mod rate_limit;
pub mod security_headers;

use axum::http::Method;

pub use csrf::csrf_middleware;
pub use rate_limit::rate_limit_middleware;
pub use security_headers::security_headers_middleware;

/// Methods that must carry a CSRF token and count against the rate limit.
pub fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}
