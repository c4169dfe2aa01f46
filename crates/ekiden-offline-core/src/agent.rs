//! The offline agent: the one object a host talks to.
//!
//! A host forwards three kinds of events:
//! - `install` once, before the agent takes over
//! - `activate` once installed
//! - `handle_fetch` for every intercepted request, possibly concurrently
//!
//! The agent is `Send + Sync`; share it behind an `Arc`.

use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheError, CacheStorage};
use crate::config::{AgentConfig, ConfigError};
use crate::fetch::Fetcher;
use crate::http::{Request, Response};
use crate::lifecycle::{Host, Lifecycle, LifecycleError, LifecycleState, RecordingHost};
use crate::router::Route;
use crate::strategy::{self, StrategyContext};

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Cache storage failed: {0}")]
    Cache(#[from] CacheError),
}

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Use this response instead of the host's own network handling.
    Respond(Response),
    /// Not intercepted; the host handles the request as if no agent existed.
    Passthrough,
}

impl FetchOutcome {
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

pub struct OfflineAgent {
    config: AgentConfig,
    root: Url,
    precache: Vec<Url>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn Host>,
    lifecycle: Lifecycle,
}

impl OfflineAgent {
    /// Build an agent. URLs in the configuration are validated here so that
    /// install and fetch handling never see a malformed origin.
    pub fn new(
        config: AgentConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ConfigError> {
        let root = config.root_url()?;
        let precache = config.precache_urls()?;
        Ok(Self {
            config,
            root,
            precache,
            storage,
            fetcher,
            host: Arc::new(RecordingHost::new()),
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = host;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Precache the app shell. Returns the number of resources stored.
    pub async fn install(&self) -> Result<usize, LifecycleError> {
        self.lifecycle
            .install(
                &self.storage,
                self.fetcher.as_ref(),
                self.host.as_ref(),
                &self.config.caches.static_assets,
                &self.precache,
            )
            .await
    }

    /// Remove stale cache stores. Returns the names deleted.
    pub async fn activate(&self) -> Result<Vec<String>, LifecycleError> {
        self.lifecycle
            .activate(self.storage.as_ref(), self.host.as_ref(), &self.config.caches)
            .await
    }

    pub fn route(&self, request: &Request) -> Route {
        self.config.routing.classify(request)
    }

    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, AgentError> {
        let route = self.route(request);
        debug!(
            method = %request.method(),
            url = %request.url(),
            route = %route,
            "Intercepted request"
        );

        let response = match route {
            Route::Passthrough => return Ok(FetchOutcome::Passthrough),
            Route::CacheFirst => self.cache_first(request).await?,
            Route::NetworkFirst => self.network_first(request).await?,
        };
        Ok(FetchOutcome::Respond(response))
    }

    pub async fn cache_first(&self, request: &Request) -> Result<Response, AgentError> {
        Ok(strategy::cache_first(&self.strategy_context(), request).await?)
    }

    pub async fn network_first(&self, request: &Request) -> Result<Response, AgentError> {
        Ok(strategy::network_first(&self.strategy_context(), request).await?)
    }

    fn strategy_context(&self) -> StrategyContext<'_> {
        StrategyContext {
            storage: self.storage.as_ref(),
            fetcher: self.fetcher.as_ref(),
            caches: &self.config.caches,
            root: &self.root,
            offline_html: &self.config.offline_html,
        }
    }
}
