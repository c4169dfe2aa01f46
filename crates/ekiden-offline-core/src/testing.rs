//! Test doubles for the host seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};

use crate::cache::{CacheError, CacheStorage, EntryMeta, MemoryCacheStorage};
use crate::fetch::{FetchError, Fetcher};
use crate::http::{Request, Response};

pub const TEST_ORIGIN: &str = "http://localhost:8080";

/// Absolute URL for `path_or_url`; paths are taken relative to the test origin.
pub fn absolute(path_or_url: &str) -> String {
    if path_or_url.starts_with('/') {
        format!("{}{}", TEST_ORIGIN, path_or_url)
    } else {
        path_or_url.to_string()
    }
}

pub fn get(path_or_url: &str) -> Request {
    Request::get(Url::parse(&absolute(path_or_url)).unwrap())
}

enum Scripted {
    Respond(StatusCode, String, Vec<(HeaderName, HeaderValue)>),
    Fail,
}

/// Scripted network. Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(absolute(url), Scripted::Respond(status, body.to_string(), Vec::new()));
    }

    pub fn respond_with_header(
        &self,
        url: &str,
        status: StatusCode,
        body: &str,
        header: (HeaderName, HeaderValue),
    ) {
        self.routes.lock().unwrap().insert(
            absolute(url),
            Scripted::Respond(status, body.to_string(), vec![header]),
        );
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(absolute(url), Scripted::Fail);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        let url = absolute(url);
        self.calls.lock().unwrap().iter().filter(|c| **c == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url().to_string();
        self.calls.lock().unwrap().push(url.clone());

        match self.routes.lock().unwrap().get(&url) {
            Some(Scripted::Respond(status, body, headers)) => {
                let response = headers
                    .iter()
                    .fold(Response::new(*status, body.clone()), |response, (name, value)| {
                        response.with_header(name.clone(), value.clone())
                    });
                Ok(response)
            }
            Some(Scripted::Fail) | None => Err(FetchError::Unreachable(url)),
        }
    }
}

/// Memory storage that counts how often it is used.
pub struct CountingStorage {
    inner: MemoryCacheStorage,
    touches: AtomicUsize,
    puts: AtomicUsize,
}

impl CountingStorage {
    pub fn new(inner: MemoryCacheStorage) -> Self {
        Self {
            inner,
            touches: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryCacheStorage {
        &self.inner
    }

    /// Every call of any kind.
    pub fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.touches.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for CountingStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.touch();
        self.inner.open(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.touch();
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        self.touch();
        self.inner.delete(name).await
    }

    async fn match_in(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        self.touch();
        self.inner.match_in(name, request).await
    }

    async fn put(
        &self,
        name: &str,
        request: &Request,
        response: Response,
    ) -> Result<(), CacheError> {
        self.touch();
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(name, request, response).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<EntryMeta>, CacheError> {
        self.touch();
        self.inner.entries(name).await
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        self.touch();
        self.inner.match_any(request).await
    }
}

/// Storage whose every operation fails, standing in for an unavailable host store.
pub struct BrokenStorage;

#[async_trait]
impl CacheStorage for BrokenStorage {
    async fn open(&self, _name: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("broken".to_string()))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Err(CacheError::Unavailable("broken".to_string()))
    }

    async fn delete(&self, _name: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("broken".to_string()))
    }

    async fn match_in(
        &self,
        _name: &str,
        _request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        Err(CacheError::Unavailable("broken".to_string()))
    }

    async fn put(
        &self,
        _name: &str,
        _request: &Request,
        _response: Response,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("broken".to_string()))
    }

    async fn entries(&self, _name: &str) -> Result<Vec<EntryMeta>, CacheError> {
        Err(CacheError::Unavailable("broken".to_string()))
    }
}
