//! `reqwest`-backed network fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{FetchError, Fetcher};
use crate::http::{Request, Response};

/// Default HTTP request timeout in seconds.
/// Long enough for a slow mobile link, short enough that the offline
/// fallback kicks in before the user gives up.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Network fetcher over a shared `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!(
            url = %request.url(),
            status = status.as_u16(),
            bytes = body.len(),
            "Fetched from network"
        );

        Ok(Response::from_parts(
            status,
            status.canonical_reason().unwrap_or_default(),
            headers,
            body,
        ))
    }
}
