use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ensure_get, CacheError, CacheStorage, EntryMeta};
use crate::http::{Request, Response};

struct StoredEntry {
    meta: EntryMeta,
    body: Bytes,
}

struct NamedStore {
    name: String,
    entries: Vec<StoredEntry>,
}

/// In-process cache storage. Stores keep their creation order.
#[derive(Default)]
pub struct MemoryCacheStorage {
    stores: RwLock<Vec<NamedStore>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn get_or_create<'a>(stores: &'a mut Vec<NamedStore>, name: &str) -> &'a mut NamedStore {
    let index = match stores.iter().position(|s| s.name == name) {
        Some(index) => index,
        None => {
            debug!(cache = name, "Creating cache store");
            stores.push(NamedStore {
                name: name.to_string(),
                entries: Vec::new(),
            });
            stores.len() - 1
        }
    };
    &mut stores[index]
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let mut stores = self.stores.write().await;
        get_or_create(&mut stores, name);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let stores = self.stores.read().await;
        Ok(stores.iter().map(|s| s.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|s| s.name != name);
        Ok(stores.len() != before)
    }

    async fn match_in(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        if !request.is_get() {
            return Ok(None);
        }
        let stores = self.stores.read().await;
        let Some(store) = stores.iter().find(|s| s.name == name) else {
            return Ok(None);
        };
        store
            .entries
            .iter()
            .find(|e| e.meta.matches(request))
            .map(|e| e.meta.to_response(e.body.clone()))
            .transpose()
    }

    async fn put(
        &self,
        name: &str,
        request: &Request,
        mut response: Response,
    ) -> Result<(), CacheError> {
        ensure_get(request)?;
        let meta = EntryMeta::capture(request, &response)?;
        let body = response.bytes()?;

        let mut stores = self.stores.write().await;
        let store = get_or_create(&mut stores, name);
        store.entries.retain(|e| !e.meta.matches(request));
        store.entries.push(StoredEntry { meta, body });
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<EntryMeta>, CacheError> {
        let stores = self.stores.read().await;
        Ok(stores
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.entries.iter().map(|e| e.meta.clone()).collect())
            .unwrap_or_default())
    }
}
