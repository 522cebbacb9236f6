//! Client-side CSRF token cache.
//!
//! # Responsibilities
//! - Hand out a cached token when one is held
//! - Coalesce concurrent misses into a single outstanding fetch
//! - Turn fetch failures and timeouts into `None`
//!
//! # Design Decisions
//! - The in-flight fetch is a `Shared` future; every waiter polls the same one
//! - `None` is returned to the waiters of that fetch but never cached
//! - A fetch invalidated while in flight is still returned to its waiters but
//!   does not repopulate the cache
//! - Refreshes join an in-flight fetch; only an explicit invalidate drops one

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const TOKEN_PATH: &str = "/api/csrf-token";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned status {0}")]
    Status(StatusCode),
}

/// Source of fresh tokens.
pub trait TokenFetcher: Send + Sync + 'static {
    /// `Ok(None)` means the caller is not authenticated and needs no token.
    fn fetch(&self) -> BoxFuture<'static, Result<Option<String>, FetchError>>;
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[allow(dead_code)]
    authenticated: bool,
    token: Option<String>,
}

/// Fetches tokens from a server's token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenFetcher {
    client: Client,
    url: String,
}

impl HttpTokenFetcher {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH),
        }
    }
}

impl TokenFetcher for HttpTokenFetcher {
    fn fetch(&self) -> BoxFuture<'static, Result<Option<String>, FetchError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        async move {
            let resp = client.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }
            let body: TokenBody = resp.json().await?;
            Ok(body.token)
        }
        .boxed()
    }
}

type SharedFetch = Shared<BoxFuture<'static, Option<String>>>;

enum Slot {
    Empty,
    Pending(SharedFetch),
    Ready(String),
}

/// Per-client token cache. Clones share the same slot.
pub struct TokenCache<F> {
    fetcher: Arc<F>,
    slot: Arc<Mutex<Slot>>,
    fetch_timeout: Duration,
}

impl<F> Clone for TokenCache<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            slot: self.slot.clone(),
            fetch_timeout: self.fetch_timeout,
        }
    }
}

impl<F: TokenFetcher> TokenCache<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            slot: Arc::new(Mutex::new(Slot::Empty)),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Cached token, or the result of the (possibly shared) in-flight fetch.
    pub async fn get_token(&self) -> Option<String> {
        let fetch = {
            let mut slot = self.lock();
            match &*slot {
                Slot::Ready(token) => return Some(token.clone()),
                Slot::Pending(fetch) => fetch.clone(),
                Slot::Empty => {
                    let fetch = self.start_fetch();
                    *slot = Slot::Pending(fetch.clone());
                    fetch
                }
            }
        };

        let result = fetch.clone().await;

        let mut slot = self.lock();
        if let Slot::Pending(current) = &*slot {
            if current.ptr_eq(&fetch) {
                *slot = match &result {
                    Some(token) => Slot::Ready(token.clone()),
                    None => Slot::Empty,
                };
            }
        }
        result
    }

    /// Drop the cached token; an in-flight fetch will not be cached.
    pub fn invalidate_token(&self) {
        *self.lock() = Slot::Empty;
    }

    /// Drop the cached token and fetch a fresh one.
    ///
    /// A fetch already in flight is joined rather than restarted, so a burst
    /// of concurrent refreshes costs one request.
    pub async fn refresh_token(&self) -> Option<String> {
        {
            let mut slot = self.lock();
            if let Slot::Ready(_) = &*slot {
                *slot = Slot::Empty;
            }
        }
        self.get_token().await
    }

    /// Refresh after the server rejected `rejected`.
    ///
    /// If another caller already replaced that token, the newer one is
    /// returned without fetching.
    pub async fn refresh_rejected(&self, rejected: &str) -> Option<String> {
        {
            let mut slot = self.lock();
            if matches!(&*slot, Slot::Ready(token) if token == rejected) {
                *slot = Slot::Empty;
            }
        }
        self.get_token().await
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_fetch(&self) -> SharedFetch {
        let fetcher = self.fetcher.clone();
        let timeout = self.fetch_timeout;
        async move {
            match tokio::time::timeout(timeout, fetcher.fetch()).await {
                Ok(Ok(token)) => token,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "CSRF token fetch failed");
                    None
                }
                Err(_) => {
                    tracing::warn!(timeout_ms = timeout.as_millis() as u64, "CSRF token fetch timed out");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}
