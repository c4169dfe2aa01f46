//! Named, persistent request/response cache stores.
//!
//! `CacheStorage` is the seam between the agent and wherever responses
//! actually live. Two implementations ship with the crate:
//! - `MemoryCacheStorage`: in-process, lost on drop
//! - `DiskCacheStorage`: one directory per store under a root directory
//!
//! Only GET requests are ever stored or matched.

pub mod disk;
pub mod entry;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use thiserror::Error;

use crate::http::{BodyError, Request, Response};

pub use disk::DiskCacheStorage;
pub use entry::{EntryMeta, VaryField};
pub use memory::MemoryCacheStorage;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode cache metadata: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(Method),

    #[error("Cannot cache response: {0}")]
    Body(#[from] BodyError),

    #[error("Cannot cache response for {0}: it varies on every request header")]
    VaryAll(String),

    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),
}

/// Host-side storage of named cache stores.
///
/// Implementations do their own locking; the agent calls them from many
/// concurrent request handlers.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named store if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Names of all stores, in creation order.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a whole store. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Look up `request` in a single store.
    async fn match_in(&self, name: &str, request: &Request)
        -> Result<Option<Response>, CacheError>;

    /// Store `response` under `request`, replacing every entry that matches
    /// `request`. Creates the store if needed. Non-GET requests and `Vary: *`
    /// responses are rejected without touching existing entries.
    async fn put(&self, name: &str, request: &Request, response: Response)
        -> Result<(), CacheError>;

    /// Metadata for every entry in a store.
    async fn entries(&self, name: &str) -> Result<Vec<EntryMeta>, CacheError>;

    /// Look up `request` across every store, oldest store first.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        if !request.is_get() {
            return Ok(None);
        }
        for name in self.keys().await? {
            if let Some(response) = self.match_in(&name, request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Handle on one named store, returned by [`open`].
#[derive(Clone)]
pub struct Cache {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl Cache {
    pub async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        self.storage.put(&self.name, request, response).await
    }
}

/// Open (creating if needed) the store called `name`.
pub async fn open(storage: Arc<dyn CacheStorage>, name: &str) -> Result<Cache, CacheError> {
    storage.open(name).await?;
    Ok(Cache {
        storage,
        name: name.to_string(),
    })
}

pub(crate) fn ensure_get(request: &Request) -> Result<(), CacheError> {
    if request.is_get() {
        Ok(())
    } else {
        Err(CacheError::UnsupportedMethod(request.method().clone()))
    }
}
