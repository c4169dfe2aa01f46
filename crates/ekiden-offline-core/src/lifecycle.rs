//! Install and activate.
//!
//! Install precaches the app shell into the static store and asks the host
//! to skip waiting. Activate removes every store that is not current and
//! asks the host to claim open clients. Neither step retries.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use futures::future::try_join_all;
use reqwest::Url;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{self, CacheError, CacheStorage};
use crate::config::CacheNames;
use crate::fetch::Fetcher;
use crate::http::{Request, Response};

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Created, nothing run yet
    Parsed = 0,
    Installing = 1,
    /// Precache complete, waiting to activate
    Installed = 2,
    Activating = 3,
    /// Stale stores removed, clients claimed
    Activated = 4,
    /// Install failed; this agent should not take over
    Redundant = 5,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Parsed,
            1 => LifecycleState::Installing,
            2 => LifecycleState::Installed,
            3 => LifecycleState::Activating,
            4 => LifecycleState::Activated,
            _ => LifecycleState::Redundant,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Parsed => write!(f, "parsed"),
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Installed => write!(f, "installed"),
            LifecycleState::Activating => write!(f, "activating"),
            LifecycleState::Activated => write!(f, "activated"),
            LifecycleState::Redundant => write!(f, "redundant"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Failed to precache {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error(transparent)]
    Storage(#[from] CacheError),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Install failed: {0}")]
    Install(#[from] InstallError),

    #[error("Activate failed: {0}")]
    Activate(#[from] CacheError),

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },
}

// ============================================================================
// Host signals
// ============================================================================

/// Signals the agent sends back to whatever hosts it.
pub trait Host: Send + Sync {
    /// Make this version active without waiting for old sessions to close.
    fn skip_waiting(&self);

    /// Take control of sessions that are already open.
    fn claim_clients(&self);
}

/// Host that only remembers which signals it received.
#[derive(Debug, Default)]
pub struct RecordingHost {
    skipped_waiting: AtomicBool,
    claimed_clients: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped_waiting(&self) -> bool {
        self.skipped_waiting.load(Ordering::SeqCst)
    }

    pub fn claimed_clients(&self) -> bool {
        self.claimed_clients.load(Ordering::SeqCst)
    }
}

impl Host for RecordingHost {
    fn skip_waiting(&self) {
        self.skipped_waiting.store(true, Ordering::SeqCst);
    }

    fn claim_clients(&self) {
        self.claimed_clients.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Parsed as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Move into `next` if the current state is one of `allowed`.
    fn begin(
        &self,
        action: &'static str,
        allowed: &[LifecycleState],
        next: LifecycleState,
    ) -> Result<(), LifecycleError> {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            let state = LifecycleState::from_u8(current);
            if !allowed.contains(&state) {
                return Err(LifecycleError::InvalidState { action, state });
            }
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Fetch every URL in `urls` and store all of them in `cache_name`.
    /// Nothing is stored unless every fetch returns an ok response. Writes
    /// happen after all fetches succeed and are not rolled back: a storage
    /// error partway through fails the install but keeps earlier entries.
    pub async fn install(
        &self,
        storage: &Arc<dyn CacheStorage>,
        fetcher: &dyn Fetcher,
        host: &dyn Host,
        cache_name: &str,
        urls: &[Url],
    ) -> Result<usize, LifecycleError> {
        self.begin(
            "install",
            &[
                LifecycleState::Parsed,
                LifecycleState::Installed,
                LifecycleState::Activated,
                LifecycleState::Redundant,
            ],
            LifecycleState::Installing,
        )?;

        match precache(storage, fetcher, cache_name, urls).await {
            Ok(count) => {
                self.set(LifecycleState::Installed);
                info!(cache = cache_name, count, "Cached static assets");
                host.skip_waiting();
                Ok(count)
            }
            Err(e) => {
                self.set(LifecycleState::Redundant);
                warn!(cache = cache_name, error = %e, "Install failed");
                Err(e.into())
            }
        }
    }

    /// Delete every store that is not current. Returns the deleted names.
    pub async fn activate(
        &self,
        storage: &dyn CacheStorage,
        host: &dyn Host,
        names: &CacheNames,
    ) -> Result<Vec<String>, LifecycleError> {
        self.begin(
            "activate",
            &[LifecycleState::Installed, LifecycleState::Activated],
            LifecycleState::Activating,
        )?;

        match delete_stale(storage, names).await {
            Ok(deleted) => {
                self.set(LifecycleState::Activated);
                host.claim_clients();
                Ok(deleted)
            }
            Err(e) => {
                // Still installed; the host may try activating again
                self.set(LifecycleState::Installed);
                warn!(error = %e, "Activate failed");
                Err(e.into())
            }
        }
    }
}

async fn precache(
    storage: &Arc<dyn CacheStorage>,
    fetcher: &dyn Fetcher,
    cache_name: &str,
    urls: &[Url],
) -> Result<usize, InstallError> {
    let cache = cache::open(Arc::clone(storage), cache_name).await?;

    let fetched = try_join_all(urls.iter().map(|url| async move {
        let request = Request::get(url.clone());
        let response = fetcher
            .fetch(&request)
            .await
            .map_err(|e| InstallError::Precache {
                url: url.to_string(),
                reason: e.summary(),
            })?;
        if !response.is_ok() {
            return Err(InstallError::Precache {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }
        Ok::<(Request, Response), InstallError>((request, response))
    }))
    .await?;

    let count = fetched.len();
    for (request, response) in fetched {
        cache.put(&request, response).await?;
    }
    Ok(count)
}

async fn delete_stale(
    storage: &dyn CacheStorage,
    names: &CacheNames,
) -> Result<Vec<String>, CacheError> {
    let stale: Vec<String> = storage
        .keys()
        .await?
        .into_iter()
        .filter(|name| !names.is_current(name))
        .collect();

    try_join_all(stale.iter().map(|name| async move {
        storage.delete(name).await?;
        info!(cache = name.as_str(), "Deleted stale cache");
        Ok::<(), CacheError>(())
    }))
    .await?;

    Ok(stale)
}
