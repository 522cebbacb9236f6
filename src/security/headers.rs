//! Security response headers.
//!
//! # Responsibilities
//! - Compute the fixed header set for a JSON API surface
//! - Decide HSTS from the environment and an explicit override
//! - Stamp the headers onto every response
//!
//! # Design Decisions
//! - One pure function, environment passed in explicitly
//! - No Content-Security-Policy, Referrer-Policy or Cross-Origin-Opener-Policy:
//!   the API never renders HTML

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use axum::http::header::{STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};

use crate::config::Environment;

pub const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

/// Features disabled through `Permissions-Policy`.
pub const DISABLED_FEATURES: &[&str] = &[
    "geolocation",
    "microphone",
    "camera",
    "payment",
    "usb",
    "magnetometer",
    "gyroscope",
    "speaker-selection",
    "vr",
    "xr",
];

const PERMISSIONS_POLICY_VALUE: &str = "geolocation=(), microphone=(), camera=(), payment=(), usb=(), magnetometer=(), gyroscope=(), speaker-selection=(), vr=(), xr=()";

static CROSS_ORIGIN_RESOURCE_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-resource-policy");
static PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// Immutable set of response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeaderSet {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaderSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Overwrite these headers on a response.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// Compute the security headers for an environment.
///
/// HSTS is sent when `include_hsts` is `Some(true)`, or when it is `None` and
/// the environment is production. `Some(false)` always suppresses it.
pub fn compute_headers(env: Environment, include_hsts: Option<bool>) -> SecurityHeaderSet {
    let mut headers = vec![
        (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (
            CROSS_ORIGIN_RESOURCE_POLICY.clone(),
            HeaderValue::from_static("same-site"),
        ),
        (
            PERMISSIONS_POLICY.clone(),
            HeaderValue::from_static(PERMISSIONS_POLICY_VALUE),
        ),
    ];

    if include_hsts.unwrap_or(env.is_production()) {
        headers.push((STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS_VALUE)));
    }

    SecurityHeaderSet { headers }
}
