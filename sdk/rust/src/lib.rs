//! Client for services behind api-shield.

pub mod client;
pub mod token_cache;

pub use client::{ClientError, ShieldClient};
pub use token_cache::{FetchError, HttpTokenFetcher, TokenCache, TokenFetcher};
