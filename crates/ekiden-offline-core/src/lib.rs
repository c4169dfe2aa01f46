//! Ekiden Offline Core - request interception and offline caching for the Ekiden web app.
//!
//! This crate contains the pieces a host needs to serve the app while the
//! network is down:
//! - `router`: decides per request between cache-first, network-first or no interception
//! - `strategy`: the two fetch strategies and their offline fallbacks
//! - `lifecycle`: install (precache) and activate (stale cache cleanup)
//! - `cache`: named cache stores, in memory or on disk
//! - `fetch`: the network seam and its `reqwest` implementation
//! - `agent`: `OfflineAgent`, tying the above together
//! - `config`: cache names, precache list, routing rules

pub mod agent;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod router;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{AgentError, FetchOutcome, OfflineAgent};
pub use cache::{CacheError, CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::{AgentConfig, CacheNames};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use http::{Body, Request, Response};
pub use lifecycle::{Host, LifecycleError, LifecycleState, RecordingHost};
pub use router::{Route, RoutingRules};
