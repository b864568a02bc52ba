use async_trait::async_trait;
use reqwest::{Request, Response};

/// Sends a prepared request to the feed host.
///
/// Implemented by [`super::BasicClient`] and wrapped by decorators such as
/// [`super::CacheBust`] that rewrite the request before forwarding it.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
