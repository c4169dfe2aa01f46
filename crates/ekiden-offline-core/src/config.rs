//! Agent configuration.
//!
//! Everything that was once hardcoded into the agent lives here: the two
//! current cache names, the precache list, the routing rules and the
//! offline page. Defaults reproduce the Ekiden app's values, so an empty
//! or missing config file gives the stock behaviour.
//!
//! Configuration is stored at `~/.config/ekiden-offline/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::client::DEFAULT_TIMEOUT_SECS;
use crate::router::RoutingRules;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "ekiden-offline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the application origin
pub const ORIGIN_ENV: &str = "EKIDEN_ORIGIN";

/// Origin of the Ekiden app when served locally
const DEFAULT_ORIGIN: &str = "http://localhost:8080";

pub const DEFAULT_DYNAMIC_CACHE: &str = "ekiden-app-v1";
pub const DEFAULT_STATIC_CACHE: &str = "ekiden-static-v1";

pub const DEFAULT_OFFLINE_HTML: &str =
    "<html><body><h1>オフラインです</h1><p>ネットワーク接続を確認してください。</p></body></html>";

const DEFAULT_PRECACHE: [&str; 5] = [
    "/",
    "/static/manifest.json",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
    "https://cdn.jsdelivr.net/npm/bootstrap-icons@1.10.0/font/bootstrap-icons.css",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Invalid precache entry {entry:?}: {reason}")]
    InvalidPrecacheUrl { entry: String, reason: String },
}

/// The two cache stores considered current. Every other store is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheNames {
    /// Network-first responses land here.
    pub dynamic: String,
    /// Precached assets and cache-first responses land here.
    #[serde(rename = "static")]
    pub static_assets: String,
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            dynamic: DEFAULT_DYNAMIC_CACHE.to_string(),
            static_assets: DEFAULT_STATIC_CACHE.to_string(),
        }
    }
}

impl CacheNames {
    pub fn is_current(&self, name: &str) -> bool {
        name == self.dynamic || name == self.static_assets
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Origin the app is served from; relative precache entries and the
    /// offline root page resolve against it.
    pub origin: String,
    pub caches: CacheNames,
    /// Resources written to the static cache on install. All or nothing.
    pub precache: Vec<String>,
    pub routing: RoutingRules,
    pub offline_html: String,
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            caches: CacheNames::default(),
            precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
            routing: RoutingRules::default(),
            offline_html: DEFAULT_OFFLINE_HTML.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    /// Load from the default location, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Root directory for the on-disk cache storage.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn apply_env(&mut self) {
        if let Ok(origin) = std::env::var(ORIGIN_ENV) {
            if !origin.trim().is_empty() {
                self.origin = origin.trim().to_string();
            }
        }
    }

    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin).map_err(|e| ConfigError::InvalidOrigin {
            origin: self.origin.clone(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidOrigin {
                origin: self.origin.clone(),
                reason: "not a hierarchical URL".to_string(),
            });
        }
        Ok(url)
    }

    /// The app's root page, served as the last cached fallback when offline.
    pub fn root_url(&self) -> Result<Url, ConfigError> {
        let origin = self.origin_url()?;
        origin.join("/").map_err(|e| ConfigError::InvalidOrigin {
            origin: self.origin.clone(),
            reason: e.to_string(),
        })
    }

    /// Precache entries resolved against the origin. Absolute entries are kept as-is.
    pub fn precache_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let origin = self.origin_url()?;
        self.precache
            .iter()
            .map(|entry| {
                origin.join(entry).map_err(|e| ConfigError::InvalidPrecacheUrl {
                    entry: entry.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
