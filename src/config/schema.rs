//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime environment discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Root configuration for the shield.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Runtime environment (production, development, test).
    pub environment: Environment,

    /// Listener configuration.
    pub listener: ListenerConfig,

    /// CORS allow-list.
    pub cors: CorsConfig,

    /// CSRF token settings.
    pub csrf: CsrfConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Security response headers.
    pub headers: HeadersConfig,

    /// How the external identity provider marks a request as authenticated.
    pub identity: IdentityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Comma-separated origin list. `None` falls back to the default origin.
    pub origins: Option<String>,
}

/// CSRF token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Server-wide HMAC secret, at least 32 bytes.
    pub secret: Option<String>,

    /// Maximum token age in seconds.
    pub max_age_secs: u64,

    /// Request header carrying the token.
    pub header_name: String,
}

impl CsrfConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            secret: None,
            max_age_secs: 3600,
            header_name: "x-csrf-token".to_string(),
        }
    }
}

/// Rate limiter backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitMode {
    /// In-process sliding window, lost on restart.
    #[default]
    Memory,
    /// Sliding window persisted in Postgres.
    Durable,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting of state-changing requests.
    pub enabled: bool,

    /// Backend selection.
    pub mode: RateLimitMode,

    /// Sliding window length in milliseconds.
    pub window_ms: u64,

    /// Maximum admitted requests per identifier per window.
    pub max_requests: u32,

    /// Interval between cleanup sweeps in seconds.
    pub cleanup_interval_secs: u64,

    /// Deadline for each durable store call in milliseconds.
    pub store_timeout_ms: u64,

    /// Postgres connection string for durable mode.
    pub database_url: Option<String>,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: RateLimitMode::Memory,
            window_ms: 60_000,
            max_requests: 100,
            cleanup_interval_secs: 300, // 5 minutes
            store_timeout_ms: 2_000,
            database_url: None,
        }
    }
}

/// Security header configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HeadersConfig {
    /// Force HSTS on or off. Unset means "production only".
    pub include_hsts: Option<bool>,
}

/// Identity provider integration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Header whose presence marks a request as authenticated.
    pub header: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            header: "authorization".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON logs. Production always logs JSON.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(" dev ".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("test".parse::<Environment>().unwrap(), Environment::Test);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ShieldConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.csrf.max_age_secs, 3600);
        assert_eq!(config.rate_limit.cleanup_interval_secs, 300);
        assert_eq!(config.rate_limit.mode, RateLimitMode::Memory);
        assert!(config.headers.include_hsts.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: ShieldConfig = toml::from_str(
            r#"
            environment = "production"

            [rate_limit]
            mode = "durable"
            max_requests = 5

            [headers]
            include_hsts = false
            "#,
        )
        .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.rate_limit.mode, RateLimitMode::Durable);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.headers.include_hsts, Some(false));
    }
}
