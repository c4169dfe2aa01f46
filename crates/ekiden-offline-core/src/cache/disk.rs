//! Filesystem-backed cache storage.
//!
//! Layout under the root directory:
//! - `caches.json`: store names in creation order, each mapped to a directory
//! - `<store dir>/<key hash>.json`: metadata for every variant of one request
//! - `<store dir>/<variant id>.body`: raw response body

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ensure_get, CacheError, CacheStorage, EntryMeta};
use crate::http::{Request, Response};

/// Manifest file name in the storage root
const MANIFEST_FILE: &str = "caches.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    name: String,
    dir: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    caches: Vec<ManifestEntry>,
}

impl Manifest {
    fn dir_of(&self, name: &str) -> Option<&str> {
        self.caches
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.dir.as_str())
    }
}

pub struct DiskCacheStorage {
    root: PathBuf,
    manifest: RwLock<Manifest>,
}

impl DiskCacheStorage {
    /// Open the storage rooted at `root`, creating the directory if needed.
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root)?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            let contents = std::fs::read_to_string(&manifest_path)?;
            serde_json::from_str(&contents)?
        } else {
            Manifest::default()
        };

        Ok(Self {
            root,
            manifest: RwLock::new(manifest),
        })
    }

    fn store_dir(&self, dir: &str) -> PathBuf {
        self.root.join(dir)
    }

    async fn save_manifest(&self, manifest: &Manifest) -> Result<(), CacheError> {
        let contents = serde_json::to_string_pretty(manifest)?;
        write_atomic(&self.root.join(MANIFEST_FILE), contents.as_bytes()).await
    }

    /// Returns the store directory, creating the store if it is new.
    async fn ensure_store(
        &self,
        manifest: &mut Manifest,
        name: &str,
    ) -> Result<PathBuf, CacheError> {
        if let Some(dir) = manifest.dir_of(name) {
            let path = self.store_dir(dir);
            tokio::fs::create_dir_all(&path).await?;
            return Ok(path);
        }

        let dir = short_hash(name.as_bytes());
        let path = self.store_dir(&dir);
        tokio::fs::create_dir_all(&path).await?;
        manifest.caches.push(ManifestEntry {
            name: name.to_string(),
            dir,
            created_at: Utc::now(),
        });
        self.save_manifest(manifest).await?;
        debug!(cache = name, path = %path.display(), "Created cache store");
        Ok(path)
    }
}

fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..16])
}

fn key_file(store: &Path, request_key: &str) -> PathBuf {
    store.join(format!("{}.json", short_hash(request_key.as_bytes())))
}

fn body_file(store: &Path, meta: &EntryMeta) -> PathBuf {
    store.join(format!("{}.body", meta.variant_id()))
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_variants(path: &Path) -> Result<Vec<EntryMeta>, CacheError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let mut manifest = self.manifest.write().await;
        self.ensure_store(&mut manifest, name).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let manifest = self.manifest.read().await;
        Ok(manifest.caches.iter().map(|c| c.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut manifest = self.manifest.write().await;
        let Some(index) = manifest.caches.iter().position(|c| c.name == name) else {
            return Ok(false);
        };

        let entry = manifest.caches.remove(index);
        self.save_manifest(&manifest).await?;

        match tokio::fs::remove_dir_all(self.store_dir(&entry.dir)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(cache = name, "Deleted cache store");
        Ok(true)
    }

    async fn match_in(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        if !request.is_get() {
            return Ok(None);
        }
        let manifest = self.manifest.read().await;
        let Some(dir) = manifest.dir_of(name) else {
            return Ok(None);
        };
        let store = self.store_dir(dir);

        let variants = read_variants(&key_file(&store, &request.cache_key())).await?;
        let Some(meta) = variants.into_iter().find(|m| m.matches(request)) else {
            return Ok(None);
        };

        let body = match tokio::fs::read(body_file(&store, &meta)).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::Corrupt {
                    key: meta.request_key.clone(),
                    reason: "missing body file".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        meta.to_response(body).map(Some)
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

        let mut manifest = self.manifest.write().await;
        let store = self.ensure_store(&mut manifest, name).await?;

        let path = key_file(&store, &meta.request_key);
        let (replaced, mut variants): (Vec<_>, Vec<_>) = read_variants(&path)
            .await?
            .into_iter()
            .partition(|v| v.matches(request));

        let new_id = meta.variant_id();
        write_atomic(&body_file(&store, &meta), &body).await?;
        variants.push(meta);
        let contents = serde_json::to_string_pretty(&variants)?;
        write_atomic(&path, contents.as_bytes()).await?;

        for old in replaced.iter().filter(|v| v.variant_id() != new_id) {
            match tokio::fs::remove_file(body_file(&store, old)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        debug!(cache = name, url = %request.url(), bytes = body.len(), "Stored response");
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<EntryMeta>, CacheError> {
        let manifest = self.manifest.read().await;
        let Some(dir) = manifest.dir_of(name) else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        let mut listing = match tokio::fs::read_dir(self.store_dir(dir)).await {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        while let Some(file) = listing.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                entries.extend(read_variants(&path).await?);
            }
        }
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE, VARY};
    use reqwest::{StatusCode, Url};

    fn request(path: &str) -> Request {
        Request::get(Url::parse(&format!("http://localhost:8080{}", path)).unwrap())
    }

    #[tokio::test]
    async fn test_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let req = request("/api/items");

        {
            let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
            let response = Response::new(StatusCode::OK, "[]")
                .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            storage.put("ekiden-app-v1", &req, response).await.unwrap();
        }

        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["ekiden-app-v1"]);

        let mut hit = storage.match_any(&req).await.unwrap().expect("persisted entry");
        assert_eq!(hit.status(), StatusCode::OK);
        assert_eq!(hit.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(hit.text().unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_vary_variants_share_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();

        let en = request("/").with_header(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        let ja = request("/").with_header(ACCEPT_LANGUAGE, HeaderValue::from_static("ja"));
        let varying = |body: &'static str| {
            Response::new(StatusCode::OK, body)
                .with_header(VARY, HeaderValue::from_static("Accept-Language"))
        };

        storage.put("app", &en, varying("hello")).await.unwrap();
        storage.put("app", &ja, varying("konnichiwa")).await.unwrap();

        assert_eq!(storage.entries("app").await.unwrap().len(), 2);
        let mut hit = storage.match_in("app", &ja).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "konnichiwa");
        let mut hit = storage.match_in("app", &en).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_put_replaces_varying_entry_and_its_body() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let en = request("/").with_header(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        let varying = Response::new(StatusCode::OK, "old")
            .with_header(VARY, HeaderValue::from_static("Accept-Language"));
        let old_meta = EntryMeta::capture(&en, &varying).unwrap();
        storage.put("app", &en, varying).await.unwrap();
        storage.put("app", &en, Response::new(StatusCode::OK, "new")).await.unwrap();

        assert_eq!(storage.entries("app").await.unwrap().len(), 1);
        let mut hit = storage.match_in("app", &en).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "new");

        let store = dir.path().join(short_hash(b"app"));
        assert!(!body_file(&store, &old_meta).exists());
    }

    #[tokio::test]
    async fn test_vary_star_is_rejected_and_keeps_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let req = request("/api/items");
        storage.put("app", &req, Response::new(StatusCode::OK, "good")).await.unwrap();

        let uncacheable = Response::new(StatusCode::OK, "bad")
            .with_header(VARY, HeaderValue::from_static("*"));
        let err = storage.put("app", &req, uncacheable).await.unwrap_err();
        assert!(matches!(err, CacheError::VaryAll(_)));

        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.entries("app").await.unwrap().len(), 1);
        let mut hit = storage.match_in("app", &req).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "good");
    }

    #[tokio::test]
    async fn test_delete_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        storage
            .put("old-v0", &request("/"), Response::new(StatusCode::OK, "stale"))
            .await
            .unwrap();
        let store_dir = dir.path().join(short_hash(b"old-v0"));
        assert!(store_dir.exists());

        assert!(storage.delete("old-v0").await.unwrap());
        assert!(!store_dir.exists());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(storage.match_any(&request("/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_body_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        let req = request("/static/app.css");
        let response = Response::new(StatusCode::OK, "body{}");
        let meta = EntryMeta::capture(&req, &response).unwrap();
        storage.put("static", &req, response).await.unwrap();

        let store = dir.path().join(short_hash(b"static"));
        std::fs::remove_file(body_file(&store, &meta)).unwrap();

        let err = storage.match_in("static", &req).await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }
}
