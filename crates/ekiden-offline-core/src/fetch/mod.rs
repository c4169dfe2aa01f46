//! Network access for the agent.
//!
//! Strategies never talk to `reqwest` directly; they go through the
//! `Fetcher` trait so a host (or a test) can supply its own network.
//! `HttpFetcher` is the real implementation.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::http::{Request, Response};

pub use client::HttpFetcher;
pub use error::FetchError;

/// The network-fetch primitive.
///
/// Any HTTP status, including 4xx and 5xx, is a successful fetch. Only a
/// failure to obtain a response at all is an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
