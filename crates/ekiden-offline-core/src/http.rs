//! Request and response types exchanged between the host, the router,
//! the strategies and the cache storage.
//!
//! A `Response` body can be read exactly once. Anything that needs to both
//! store and return a response must call [`Response::duplicate`] first.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyError {
    #[error("Response body has already been read")]
    AlreadyUsed,
}

// ============================================================================
// Request
// ============================================================================

/// An intercepted request. Immutable once handed to the agent.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Identity used by cache stores: method plus URL without fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}

// ============================================================================
// Body
// ============================================================================

/// A consume-once response body.
#[derive(Debug)]
pub struct Body {
    bytes: Option<Bytes>,
}

impl Body {
    pub fn empty() -> Self {
        Self {
            bytes: Some(Bytes::new()),
        }
    }

    pub fn is_used(&self) -> bool {
        self.bytes.is_none()
    }

    /// Read the body, leaving it marked as used.
    pub fn take(&mut self) -> Result<Bytes, BodyError> {
        self.bytes.take().ok_or(BodyError::AlreadyUsed)
    }

    fn tee(&self) -> Result<Bytes, BodyError> {
        self.bytes.clone().ok_or(BodyError::AlreadyUsed)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self { bytes: Some(bytes) }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the network, a cache store, or built by the agent itself.
///
/// Not `Clone` on purpose: a second readable copy only comes from
/// [`Response::duplicate`], which refuses to copy a consumed body.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Body>) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn from_parts(
        status: StatusCode,
        status_text: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<Body>,
    ) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers,
            body: body.into(),
        }
    }

    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// True for 200..=299.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn body_used(&self) -> bool {
        self.body.is_used()
    }

    /// Read the whole body. A second call fails with `AlreadyUsed`.
    pub fn bytes(&mut self) -> Result<Bytes, BodyError> {
        self.body.take()
    }

    /// Read the body as UTF-8 text, replacing invalid sequences.
    pub fn text(&mut self) -> Result<String, BodyError> {
        let bytes = self.body.take()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Produce an independently readable copy of this response.
    pub fn duplicate(&self) -> Result<Response, BodyError> {
        Ok(Response {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: Body::from(self.body.tee()?),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::CONTENT_TYPE;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid test url")
    }

    #[test]
    fn test_cache_key_ignores_fragment() {
        let a = Request::get(url("https://example.com/static/app.css#top"));
        let b = Request::get(url("https://example.com/static/app.css"));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "GET https://example.com/static/app.css");
    }

    #[test]
    fn test_cache_key_includes_method_and_query() {
        let get = Request::get(url("https://example.com/api/items?page=2"));
        let post = Request::new(Method::POST, url("https://example.com/api/items?page=2"));
        assert_ne!(get.cache_key(), post.cache_key());
        assert!(get.cache_key().ends_with("?page=2"));
    }

    #[test]
    fn test_body_reads_once() {
        let mut response = Response::new(StatusCode::OK, "body{}");
        assert!(!response.body_used());
        assert_eq!(response.text().unwrap(), "body{}");
        assert!(response.body_used());
        assert_eq!(response.bytes(), Err(BodyError::AlreadyUsed));
    }

    #[test]
    fn test_duplicate_is_independently_readable() {
        let mut original = Response::new(StatusCode::OK, "[]").with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let mut copy = original.duplicate().unwrap();

        assert_eq!(original.text().unwrap(), "[]");
        assert_eq!(copy.text().unwrap(), "[]");
        assert_eq!(copy.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(copy.status(), StatusCode::OK);
    }

    #[test]
    fn test_duplicate_after_read_fails() {
        let mut response = Response::new(StatusCode::OK, "x");
        response.bytes().unwrap();
        assert!(response.duplicate().is_err());
    }

    #[test]
    fn test_status_text_defaults_to_reason() {
        let response = Response::new(StatusCode::SERVICE_UNAVAILABLE, Body::empty());
        assert_eq!(response.status_text(), "Service Unavailable");
        assert!(!response.is_ok());
        let response = response.with_status_text("Offline");
        assert_eq!(response.status_text(), "Offline");
    }
}
