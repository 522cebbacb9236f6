//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ShieldConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<ShieldConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ShieldConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment variables only.
pub fn load_from_env() -> Result<ShieldConfig, ConfigError> {
    let mut config = ShieldConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment variables on a parsed config.
///
/// The lookup is injected so tests don't mutate the process environment.
pub fn apply_env_overrides<F>(config: &mut ShieldConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(env) = lookup("APP_ENV") {
        config.environment = env
            .parse()
            .map_err(|reason| ConfigError::Env { var: "APP_ENV", reason })?;
    }
    if let Some(origins) = lookup("CORS_ORIGINS") {
        config.cors.origins = Some(origins);
    }
    if let Some(secret) = lookup("CSRF_SECRET") {
        config.csrf.secret = Some(secret);
    }
    if let Some(url) = lookup("RATE_LIMIT_DATABASE_URL") {
        config.rate_limit.database_url = Some(url);
    }
    if let Some(hsts) = lookup("HSTS_ENABLED") {
        let value = hsts.parse::<bool>().map_err(|e| ConfigError::Env {
            var: "HSTS_ENABLED",
            reason: e.to_string(),
        })?;
        config.headers.include_hsts = Some(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Environment;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("APP_ENV", "production"),
            ("CORS_ORIGINS", "https://app.example.com"),
            ("CSRF_SECRET", "0123456789abcdef0123456789abcdef"),
            ("HSTS_ENABLED", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = ShieldConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.cors.origins.as_deref(), Some("https://app.example.com"));
        assert_eq!(config.headers.include_hsts, Some(false));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = ShieldConfig::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == "HSTS_ENABLED").then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("HSTS_ENABLED"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("does-not-exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
