//! HTTP access to the upstream feed.
//!
//! Requests go through the [`HttpClient`] trait so that decorators such as
//! [`CacheBust`] can rewrite them and tests can substitute canned responses.

mod basic;
mod cache_bust;
mod client;

pub use basic::BasicClient;
pub use cache_bust::{CacheBust, CacheToken};
pub use client::HttpClient;

use anyhow::{Context, Result};
use reqwest::Request;

/// Issues a GET for `url` and returns the response body.
///
/// # Errors
///
/// Fails on an invalid URL, a transport error, or a non-success status.
#[tracing::instrument(skip(client))]
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = Request::new(
        reqwest::Method::GET,
        url.parse().with_context(|| format!("invalid feed URL '{url}'"))?,
    );

    let resp = client.execute(req).await.context("feed request failed")?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("HTTP error! Status: {status}");
    }

    Ok(resp.bytes().await.context("failed to read feed body")?.to_vec())
}


#[cfg(test)]
mod tests {
    use super::testing::StaticClient;
    use super::*;

    #[tokio::test]
    async fn test_fetch_bytes_returns_body() {
        let client = StaticClient::ok("[]");
        let bytes = fetch_bytes(&client, "https://example.com/feed").await.unwrap();
        assert_eq!(bytes, b"[]");
        assert_eq!(client.request_urls(), vec!["https://example.com/feed"]);
    }

    #[tokio::test]
    async fn test_fetch_bytes_rejects_error_status() {
        let client = StaticClient::with_status(503, "unavailable");
        let err = fetch_bytes(&client, "https://example.com/feed").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_bytes_rejects_invalid_url() {
        let client = StaticClient::ok("[]");
        assert!(fetch_bytes(&client, "not a url").await.is_err());
        assert!(client.request_urls().is_empty());
    }
}
