//! Request classification.
//!
//! Each intercepted request is classified on its own, with no state kept
//! between calls. Order of the checks:
//! 1. non-GET requests are left alone
//! 2. dynamic path markers (`/api/`, `/export/`, ...) go network-first
//! 3. `/static/` paths and CDN hosts go cache-first
//! 4. anything else goes network-first

use serde::{Deserialize, Serialize};

use crate::http::Request;

/// Where an intercepted request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Do not intervene; the host handles the request itself.
    Passthrough,
    CacheFirst,
    NetworkFirst,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Passthrough => write!(f, "passthrough"),
            Route::CacheFirst => write!(f, "cache-first"),
            Route::NetworkFirst => write!(f, "network-first"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingRules {
    /// Path substrings that always go network-first. Checked before anything else.
    pub network_first_markers: Vec<String>,
    /// Path prefixes served cache-first.
    pub cache_first_prefixes: Vec<String>,
    /// Host substrings served cache-first.
    pub cdn_hosts: Vec<String>,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            network_first_markers: ["/api/", "/export/", "/add", "/edit", "/delete"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache_first_prefixes: vec!["/static/".to_string()],
            cdn_hosts: vec!["cdn.jsdelivr.net".to_string()],
        }
    }
}

impl RoutingRules {
    pub fn classify(&self, request: &Request) -> Route {
        if !request.is_get() {
            return Route::Passthrough;
        }

        let url = request.url();
        let path = url.path();

        if self.network_first_markers.iter().any(|m| path.contains(m.as_str())) {
            return Route::NetworkFirst;
        }

        let on_cdn = url
            .host_str()
            .map(|host| self.cdn_hosts.iter().any(|c| host.contains(c.as_str())))
            .unwrap_or(false);

        if on_cdn || self.cache_first_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return Route::CacheFirst;
        }

        Route::NetworkFirst
    }
}
