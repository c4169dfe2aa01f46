//! The two fetch strategies.
//!
//! Both make at most one network attempt and never surface a network
//! failure to the caller. Cache storage failures do propagate.

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::cache::{CacheError, CacheStorage};
use crate::config::CacheNames;
use crate::fetch::Fetcher;
use crate::http::{Body, Request, Response};

/// Borrowed view of everything a strategy needs.
pub struct StrategyContext<'a> {
    pub storage: &'a dyn CacheStorage,
    pub fetcher: &'a dyn Fetcher,
    pub caches: &'a CacheNames,
    /// Root page of the app, the second fallback of network-first.
    pub root: &'a Url,
    pub offline_html: &'a str,
}

/// Serve from any cache store; otherwise fetch once and keep ok responses
/// in the static store. Offline with nothing cached yields a 503.
pub async fn cache_first(
    ctx: &StrategyContext<'_>,
    request: &Request,
) -> Result<Response, CacheError> {
    if let Some(cached) = ctx.storage.match_any(request).await? {
        debug!(url = %request.url(), "Cache hit");
        return Ok(cached);
    }

    match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            if response.is_ok() {
                store(ctx, &ctx.caches.static_assets, request, &response).await?;
            }
            Ok(response)
        }
        Err(e) => {
            warn!(
                url = %request.url(),
                error = %e.summary(),
                "Network failed with nothing cached"
            );
            Ok(offline_response())
        }
    }
}

/// Fetch once and keep ok responses in the dynamic store. On network
/// failure fall back to the cached request, then the cached root page,
/// then the built-in offline page.
pub async fn network_first(
    ctx: &StrategyContext<'_>,
    request: &Request,
) -> Result<Response, CacheError> {
    let error = match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            if response.is_ok() {
                store(ctx, &ctx.caches.dynamic, request, &response).await?;
            }
            return Ok(response);
        }
        Err(e) => e,
    };
    debug!(url = %request.url(), error = %error.summary(), "Network failed, trying cache");

    if let Some(cached) = ctx.storage.match_any(request).await? {
        return Ok(cached);
    }

    if let Some(root) = ctx.storage.match_any(&Request::get(ctx.root.clone())).await? {
        debug!(url = %request.url(), "Serving cached root page");
        return Ok(root);
    }

    warn!(url = %request.url(), "Offline with no cached fallback");
    Ok(offline_page(ctx.offline_html))
}

/// Store a copy of `response`. A response that varies on `*` is served
/// but not kept.
async fn store(
    ctx: &StrategyContext<'_>,
    cache: &str,
    request: &Request,
    response: &Response,
) -> Result<(), CacheError> {
    let copy = response.duplicate()?;
    match ctx.storage.put(cache, request, copy).await {
        Err(CacheError::VaryAll(_)) => {
            debug!(url = %request.url(), cache, "Response varies on every header, not stored");
            Ok(())
        }
        result => result,
    }
}

/// 503 "Offline" with an empty body.
pub fn offline_response() -> Response {
    Response::new(StatusCode::SERVICE_UNAVAILABLE, Body::empty()).with_status_text("Offline")
}

pub fn offline_page(html: &str) -> Response {
    Response::new(StatusCode::OK, html.to_string()).with_header(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    )
}
