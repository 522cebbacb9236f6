//! CORS origin allow-list parsing and canonicalization.
//!
//! # Responsibilities
//! - Split the configured comma-separated list, trimming and dropping empties
//! - Canonicalize each entry to `scheme://host[:port]`
//! - Reject malformed URLs, non-http(s) schemes and embedded credentials
//! - Warn about insecure entries in production
//!
//! # Design Decisions
//! - Order and duplicates are preserved exactly as configured
//! - Paths, queries and fragments are normalized away, not rejected
//! - `*` is a sentinel, never parsed as a URL
//! - Runs once at startup (and on config reload); the result is immutable

use std::fmt;

use thiserror::Error;
use url::{Host, Url};

use crate::config::Environment;

/// Origin used when nothing is configured.
pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";

/// Wildcard sentinel.
pub const WILDCARD: &str = "*";

/// A configured origin that could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    #[error("Invalid CORS origin \"{origin}\": not a valid URL ({reason})")]
    Malformed { origin: String, reason: String },

    #[error("Invalid CORS origin \"{origin}\": only http and https protocols are allowed (got \"{scheme}\")")]
    DisallowedScheme { origin: String, scheme: String },

    #[error("Invalid CORS origin \"{origin}\": URLs with embedded credentials are not allowed")]
    EmbeddedCredentials { origin: String },
}

/// A non-fatal configuration smell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginWarning {
    /// `*` disables origin restriction entirely.
    Wildcard,
    /// `*` appears next to explicit origins, which it subsumes.
    WildcardMixed,
    /// Plain http origin in production.
    InsecureScheme(String),
    /// localhost or loopback origin in production.
    Loopback(String),
}

impl fmt::Display for OriginWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginWarning::Wildcard => write!(
                f,
                "SECURITY WARNING: CORS origin '*' allows requests from any origin; origin restriction is disabled (credentials are not shared with wildcard matches)"
            ),
            OriginWarning::WildcardMixed => write!(
                f,
                "CORS origin '*' is combined with explicit origins; every origin will be echoed, credentials only to the explicit ones"
            ),
            OriginWarning::InsecureScheme(origin) => write!(
                f,
                "CORS origin {} uses http in production; HTTPS should be used",
                origin
            ),
            OriginWarning::Loopback(origin) => write!(
                f,
                "CORS origin {} points at localhost in production; this is likely a misconfiguration",
                origin
            ),
        }
    }
}

/// A canonical `scheme://host[:port]` origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalOrigin {
    serialized: String,
    secure: bool,
    host: Host<String>,
}

impl CanonicalOrigin {
    /// Parse and canonicalize a single origin string.
    ///
    /// # Errors
    /// Returns an [`OriginError`] naming the input and the violated rule.
    pub fn parse(raw: &str) -> Result<Self, OriginError> {
        let url = Url::parse(raw).map_err(|e| OriginError::Malformed {
            origin: raw.to_string(),
            reason: e.to_string(),
        })?;

        let secure = match url.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(OriginError::DisallowedScheme {
                    origin: raw.to_string(),
                    scheme: other.to_string(),
                })
            }
        };

        if !url.username().is_empty() || url.password().is_some() {
            return Err(OriginError::EmbeddedCredentials {
                origin: raw.to_string(),
            });
        }

        let host = url
            .host()
            .ok_or_else(|| OriginError::Malformed {
                origin: raw.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_owned();

        Ok(Self {
            serialized: url.origin().ascii_serialization(),
            secure,
            host,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_loopback(&self) -> bool {
        match &self.host {
            Host::Domain(domain) => domain.eq_ignore_ascii_case("localhost"),
            Host::Ipv4(ip) => ip.is_loopback(),
            Host::Ipv6(ip) => ip.is_loopback(),
        }
    }
}

impl fmt::Display for CanonicalOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}

/// One entry of the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigin {
    Any,
    Exact(CanonicalOrigin),
}

impl AllowedOrigin {
    pub fn as_str(&self) -> &str {
        match self {
            AllowedOrigin::Any => WILDCARD,
            AllowedOrigin::Exact(origin) => origin.as_str(),
        }
    }
}

/// The validated, immutable allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginList {
    entries: Vec<AllowedOrigin>,
    defaulted: bool,
}

impl OriginList {
    fn default_list() -> Self {
        let origin = CanonicalOrigin {
            serialized: DEFAULT_ORIGIN.to_string(),
            secure: false,
            host: Host::Domain("localhost".to_string()),
        };
        Self {
            entries: vec![AllowedOrigin::Exact(origin)],
            defaulted: true,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AllowedOrigin> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the list fell back to [`DEFAULT_ORIGIN`].
    pub fn is_defaulted(&self) -> bool {
        self.defaulted
    }

    pub fn is_wildcard(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, AllowedOrigin::Any))
    }

    /// Canonical strings in configured order, duplicates included.
    pub fn as_strings(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.as_str().to_string()).collect()
    }

    /// Whether a request `Origin` header value is allowed.
    pub fn allows(&self, origin: &str) -> bool {
        self.is_wildcard() || self.matches_exact(origin)
    }

    /// Whether credentials may be shared with `origin`.
    ///
    /// Only explicit entries qualify; an origin admitted by `*` alone never
    /// receives `Access-Control-Allow-Credentials`.
    pub fn allows_credentials(&self, origin: &str) -> bool {
        self.matches_exact(origin)
    }

    fn matches_exact(&self, origin: &str) -> bool {
        let Ok(candidate) = CanonicalOrigin::parse(origin) else {
            return false;
        };
        self.entries.iter().any(|e| match e {
            AllowedOrigin::Exact(allowed) => allowed.as_str() == candidate.as_str(),
            AllowedOrigin::Any => false,
        })
    }
}

/// Parse a raw origin list without logging.
///
/// # Errors
/// Fails on the first entry that violates a rule.
pub fn parse_origin_list(raw: Option<&str>) -> Result<OriginList, OriginError> {
    let Some(raw) = raw else {
        return Ok(OriginList::default_list());
    };

    let mut entries = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if item == WILDCARD {
            entries.push(AllowedOrigin::Any);
        } else {
            entries.push(AllowedOrigin::Exact(CanonicalOrigin::parse(item)?));
        }
    }

    if entries.is_empty() {
        return Ok(OriginList::default_list());
    }

    Ok(OriginList {
        entries,
        defaulted: false,
    })
}

/// Environment-dependent warnings for a parsed list.
pub fn collect_warnings(list: &OriginList, env: Environment) -> Vec<OriginWarning> {
    let mut warnings = Vec::new();

    if list.is_wildcard() {
        warnings.push(OriginWarning::Wildcard);
        if list.iter().any(|e| matches!(e, AllowedOrigin::Exact(_))) {
            warnings.push(OriginWarning::WildcardMixed);
        }
    }

    if env.is_production() {
        for entry in list.iter() {
            if let AllowedOrigin::Exact(origin) = entry {
                if !origin.is_secure() {
                    warnings.push(OriginWarning::InsecureScheme(origin.to_string()));
                }
                if origin.is_loopback() {
                    warnings.push(OriginWarning::Loopback(origin.to_string()));
                }
            }
        }
    }

    warnings
}

/// Validate the configured origin list, logging notices and warnings.
///
/// # Errors
/// Returns the first [`OriginError`]; the configuration must then be refused.
pub fn validate_origins(raw: Option<&str>, env: Environment) -> Result<OriginList, OriginError> {
    let list = parse_origin_list(raw)?;

    if list.is_defaulted() {
        tracing::info!(origin = DEFAULT_ORIGIN, "No CORS origins configured, using default");
    }

    for warning in collect_warnings(&list, env) {
        tracing::warn!(environment = %env, "{}", warning);
    }

    tracing::info!(origins = ?list.as_strings(), "Resolved CORS origins");
    Ok(list)
}
