use super::HttpClient;
use async_trait::async_trait;
use chrono::Utc;

/// Query parameter carrying the cache-busting token.
pub const CACHE_PARAM: &str = "x";

/// Value written into the cache-busting query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheToken {
    /// Milliseconds since the Unix epoch at request time.
    Now,
    /// A fixed caller-supplied token.
    Fixed(String),
}

impl CacheToken {
    fn value(&self) -> String {
        match self {
            CacheToken::Now => Utc::now().timestamp_millis().to_string(),
            CacheToken::Fixed(token) => token.clone(),
        }
    }
}

/// An [`HttpClient`] wrapper that appends `x=<token>` to every request so
/// intermediate caches never serve a stale batch.
pub struct CacheBust<C> {
    pub inner: C,
    pub token: CacheToken,
}

impl<C> CacheBust<C> {
    /// Stamps each request with the current time.
    pub fn now(inner: C) -> Self {
        Self {
            inner,
            token: CacheToken::Now,
        }
    }

    pub fn fixed(inner: C, token: impl Into<String>) -> Self {
        Self {
            inner,
            token: CacheToken::Fixed(token.into()),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for CacheBust<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(CACHE_PARAM, &self.token.value());
        self.inner.execute(req).await
    }
}
