use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::token_cache::{HttpTokenFetcher, TokenCache, TokenFetcher};

pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request rejected with 403 after refreshing the CSRF token")]
    Forbidden,
}

/// HTTP client that attaches CSRF tokens to state-changing requests.
///
/// Authentication (e.g. an `Authorization` default header) is configured on
/// the `reqwest::Client` passed to [`ShieldClient::with_client`].
pub struct ShieldClient<F = HttpTokenFetcher> {
    client: Client,
    base_url: String,
    tokens: TokenCache<F>,
}

impl<F> Clone for ShieldClient<F> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

impl ShieldClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        let fetcher = HttpTokenFetcher::new(client.clone(), base_url);
        Self::with_fetcher(client, base_url, fetcher)
    }
}

impl<F: TokenFetcher> ShieldClient<F> {
    /// Use a custom token source, e.g. a token endpoint on another host.
    pub fn with_fetcher(client: Client, base_url: &str, fetcher: F) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: TokenCache::new(fetcher),
        }
    }

    pub fn tokens(&self) -> &TokenCache<F> {
        &self.tokens
    }

    /// Send a request; a 403 on a tokened request refreshes the token and
    /// retries exactly once.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ClientError> {
        if !is_state_changing(&method) {
            return Ok(self.request(method, path, body, None).send().await?);
        }

        let token = self.tokens.get_token().await;
        let resp = self
            .request(method.clone(), path, body, token.as_deref())
            .send()
            .await?;
        let rejected = match token {
            Some(token) if resp.status() == StatusCode::FORBIDDEN => token,
            _ => return Ok(resp),
        };

        tracing::debug!(path, "CSRF token rejected, refreshing and retrying");
        let token = self.tokens.refresh_rejected(&rejected).await;
        let resp = self
            .request(method, path, body, token.as_deref())
            .send()
            .await?;
        if resp.status() == StatusCode::FORBIDDEN {
            return Err(ClientError::Forbidden);
        }
        Ok(resp)
    }

    pub async fn get(&self, path: &str) -> Result<Response, ClientError> {
        self.send::<()>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ClientError> {
        self.send(Method::POST, path, Some(body)).await
    }

    fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            req = req.header(CSRF_HEADER, token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req
    }
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}
