//! Request-security layer for axum services.
//!
//! Stateless CSRF tokens, sliding-window rate limiting (in-memory or
//! Postgres-backed), CORS origin validation and security response headers.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ShieldConfig;
pub use http::{HttpServer, ShieldState};
pub use lifecycle::{initialize, Shutdown};
