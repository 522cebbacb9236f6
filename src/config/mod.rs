//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + environment variables
//!     → loader.rs (parse, deserialize, apply env overrides)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → passed explicitly into each security component
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server re-runs the origin validator and swaps the allow-list
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the CORS allow-list hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Secrets come from the environment in real deployments (CSRF_SECRET)

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    CorsConfig, CsrfConfig, Environment, HeadersConfig, IdentityConfig, ListenerConfig,
    ObservabilityConfig, RateLimitConfig, RateLimitMode, ShieldConfig,
};
pub use validation::{validate_config, ValidationError};
