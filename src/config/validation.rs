//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (window > 0, quota > 0)
//! - Reject secrets too short to sign CSRF tokens
//! - Reject malformed CORS origins before the server starts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{RateLimitMode, ShieldConfig};
use crate::security::csrf::MIN_SECRET_LEN;
use crate::security::origin::{parse_origin_list, OriginError};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("csrf.secret is not set")]
    MissingCsrfSecret,

    #[error("csrf.secret must be at least {min} bytes (got {len})")]
    CsrfSecretTooShort { len: usize, min: usize },

    #[error("csrf.max_age_secs must be greater than zero")]
    ZeroTokenAge,

    #[error("csrf.header_name '{0}' is not a valid header name")]
    InvalidHeaderName(String),

    #[error("listener.request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("rate_limit.{0} must be greater than zero")]
    ZeroRateLimitField(&'static str),

    #[error("rate_limit.database_url is required in durable mode")]
    MissingDatabaseUrl,

    #[error("{0}")]
    Origin(#[from] OriginError),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.csrf.secret.as_deref() {
        None => errors.push(ValidationError::MissingCsrfSecret),
        Some(secret) if secret.len() < MIN_SECRET_LEN => {
            errors.push(ValidationError::CsrfSecretTooShort {
                len: secret.len(),
                min: MIN_SECRET_LEN,
            });
        }
        Some(_) => {}
    }

    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.csrf.max_age_secs == 0 {
        errors.push(ValidationError::ZeroTokenAge);
    }

    if axum::http::HeaderName::from_bytes(config.csrf.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName(config.csrf.header_name.clone()));
    }

    let rl = &config.rate_limit;
    if rl.window_ms == 0 {
        errors.push(ValidationError::ZeroRateLimitField("window_ms"));
    }
    if rl.max_requests == 0 {
        errors.push(ValidationError::ZeroRateLimitField("max_requests"));
    }
    if rl.cleanup_interval_secs == 0 {
        errors.push(ValidationError::ZeroRateLimitField("cleanup_interval_secs"));
    }
    if rl.mode == RateLimitMode::Durable {
        if rl.store_timeout_ms == 0 {
            errors.push(ValidationError::ZeroRateLimitField("store_timeout_ms"));
        }
        if rl.database_url.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::MissingDatabaseUrl);
        }
    }

    if let Err(e) = parse_origin_list(config.cors.origins.as_deref()) {
        errors.push(e.into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
