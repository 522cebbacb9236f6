//! Signed, time-boxed anti-CSRF tokens.
//!
//! # Token Format
//! ```text
//! <random: 64 hex chars>.<issued_at: unix millis>.<signature: 64 hex chars>
//! signature = HMAC-SHA256(secret, "<random>|<issued_at>")
//! ```
//!
//! # Design Decisions
//! - Stateless: validity is recomputed from the token bytes and the secret
//! - Fail closed: any parse or signature problem rejects the token
//! - Signatures compared in constant time (`subtle`)
//! - Secret shorter than 32 bytes is a startup error, never a per-request one

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::CsrfConfig;
use crate::observability::metrics;
use crate::security::now_millis;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted server secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Default token lifetime.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

const RANDOM_BYTES: usize = 32;
const DELIMITER: char = '.';

/// Errors raised while constructing the service or signing a token.
#[derive(Debug, Error, PartialEq)]
pub enum CsrfError {
    /// No secret was configured.
    #[error("CSRF secret is not configured")]
    MissingSecret,

    /// The configured secret is too short to sign tokens safely.
    #[error("CSRF secret must be at least {min} bytes (got {len})")]
    SecretTooShort { len: usize, min: usize },

    /// Maps the [`hmac::digest::InvalidLength`] error.
    #[error(transparent)]
    InvalidKeyLength(#[from] hmac::digest::InvalidLength),
}

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    BadTimestamp,
    MissingSignature,
    Expired,
    BadSignature,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::Malformed => "malformed",
            Rejection::BadTimestamp => "bad_timestamp",
            Rejection::MissingSignature => "missing_signature",
            Rejection::Expired => "expired",
            Rejection::BadSignature => "bad_signature",
        }
    }
}

/// Issues and verifies CSRF tokens keyed by a server-wide secret.
#[derive(Clone)]
pub struct CsrfTokenService {
    secret: Arc<[u8]>,
    max_age: Duration,
}

impl fmt::Debug for CsrfTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfTokenService")
            .field("secret", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl CsrfTokenService {
    /// Create a service from a raw secret.
    ///
    /// # Errors
    /// Returns [`CsrfError::SecretTooShort`] when the secret has fewer than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CsrfError> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LEN {
            return Err(CsrfError::SecretTooShort {
                len: secret.len(),
                min: MIN_SECRET_LEN,
            });
        }

        Ok(Self {
            secret: Arc::from(secret),
            max_age: DEFAULT_MAX_AGE,
        })
    }

    /// Create a service from the `[csrf]` config section.
    ///
    /// # Errors
    /// Returns [`CsrfError::MissingSecret`] when no secret is configured, or
    /// [`CsrfError::SecretTooShort`] as for [`CsrfTokenService::new`].
    pub fn from_config(config: &CsrfConfig) -> Result<Self, CsrfError> {
        let secret = config.secret.as_deref().ok_or(CsrfError::MissingSecret)?;
        Ok(Self::new(secret)?.with_max_age(config.max_age()))
    }

    /// Override the max age used by [`CsrfTokenService::validate_default`].
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Generate a fresh token stamped with the current time.
    ///
    /// # Errors
    /// Only fails if the HMAC key is rejected, which cannot happen for a
    /// service built through [`CsrfTokenService::new`].
    pub fn generate(&self) -> Result<String, CsrfError> {
        self.generate_at(now_millis())
    }

    fn generate_at(&self, issued_at: u64) -> Result<String, CsrfError> {
        let mut random = [0u8; RANDOM_BYTES];
        OsRng.fill_bytes(&mut random);
        let random = hex::encode(random);

        let issued_at = issued_at.to_string();
        let signature = self.sign(&random, &issued_at)?;

        Ok(format!("{random}{DELIMITER}{issued_at}{DELIMITER}{signature}"))
    }

    /// Validate a token against the configured max age.
    pub fn validate_default(&self, token: &str) -> bool {
        self.validate(token, self.max_age)
    }

    /// Validate a token. Never panics; rejections are logged at warn level.
    pub fn validate(&self, token: &str, max_age: Duration) -> bool {
        match self.check_at(token, max_age, now_millis()) {
            Ok(()) => true,
            Err(rejection) => {
                tracing::warn!(
                    reason = rejection.as_str(),
                    token_len = token.len(),
                    "Rejected CSRF token"
                );
                metrics::record_csrf_rejection(rejection.as_str());
                false
            }
        }
    }

    /// Verify a token at an explicit point in time.
    pub fn check_at(&self, token: &str, max_age: Duration, now: u64) -> Result<(), Rejection> {
        let (random, issued_at_raw, signature) = split(token).ok_or(Rejection::Malformed)?;
        if random.is_empty() {
            return Err(Rejection::Malformed);
        }

        let issued_at: u64 = issued_at_raw.parse().map_err(|_| Rejection::BadTimestamp)?;

        if signature.is_empty() {
            return Err(Rejection::MissingSignature);
        }

        if now.saturating_sub(issued_at) > duration_millis(max_age) {
            return Err(Rejection::Expired);
        }

        let expected = self
            .sign(random, issued_at_raw)
            .map_err(|_| Rejection::BadSignature)?;

        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(())
        } else {
            Err(Rejection::BadSignature)
        }
    }

    fn sign(&self, random: &str, issued_at: &str) -> Result<String, CsrfError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)?;
        mac.update(random.as_bytes());
        mac.update(b"|");
        mac.update(issued_at.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Parse the issue timestamp without checking the signature. Diagnostics only.
pub fn issued_at(token: &str) -> Option<u64> {
    let (_, issued_at, _) = split(token)?;
    issued_at.parse().ok()
}

/// Parse-only expiry check. Unparseable tokens count as expired.
pub fn is_expired(token: &str, max_age: Duration) -> bool {
    is_expired_at(token, max_age, now_millis())
}

fn is_expired_at(token: &str, max_age: Duration, now: u64) -> bool {
    match issued_at(token) {
        Some(issued) => now.saturating_sub(issued) > duration_millis(max_age),
        None => true,
    }
}

fn split(token: &str) -> Option<(&str, &str, &str)> {
    let mut parts = token.split(DELIMITER);
    let random = parts.next()?;
    let issued_at = parts.next()?;
    let signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((random, issued_at, signature))
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
