//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     → origin.rs (validate CORS allow-list, warn on insecure entries)
//!     → headers.rs (compute response header set)
//!     → csrf.rs (check server secret)
//!
//! Incoming request:
//!     → CORS decision against the allow-list
//!     → state-changing methods only:
//!         → rate_limit (per-IP sliding window)
//!         → csrf.rs (verify x-csrf-token)
//!     → Pass to application routes
//!     → headers.rs stamps every response
//! ```
//!
//! # Design Decisions
//! - Components take explicit configuration, no ambient globals
//! - CSRF fails closed; the durable rate limiter fails open
//! - Per-request failures are logged at warn and never crash the process

pub mod csrf;
pub mod headers;
pub mod origin;
pub mod rate_limit;

use std::time::{SystemTime, UNIX_EPOCH};

pub use csrf::CsrfTokenService;
pub use headers::{compute_headers, SecurityHeaderSet};
pub use origin::{validate_origins, OriginError, OriginList};
pub use rate_limit::{RateLimitSettings, RateLimiter};

/// Wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
