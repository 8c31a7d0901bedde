//! Generation management: which generation is current, installing new ones
//! from the precache manifest, and evicting the rest on activation.

use crate::cache::{
    store::{GenerationHandle, ResourceStore},
    types::{GenerationState, GenerationTag},
};
use crate::error::{OfflineError, Result};
use crate::http::{Request, ResourceKey, Response};
use crate::transport::Transport;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of a successful install
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReport {
    pub tag: GenerationTag,
    /// Distinct manifest entries written
    pub entries: usize,
}

/// Outcome of an activation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationReport {
    pub tag: GenerationTag,
    pub previous: Option<GenerationTag>,
    /// Stale generations deleted
    pub evicted: usize,
    /// The tag was already current; nothing happened
    pub already_current: bool,
    /// Eviction failed; retried on the next activation
    pub eviction_error: Option<String>,
}

/// Owner of the current-generation register
pub struct GenerationManager {
    store: Arc<dyn ResourceStore>,
    current: RwLock<Option<GenerationTag>>,
    states: RwLock<HashMap<GenerationTag, GenerationState>>,
    /// Serializes activations so an eviction never runs against a tag
    /// another activation has just made current
    transition: Mutex<()>,
}

impl GenerationManager {
    /// Create a manager with no current generation
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            states: RwLock::new(HashMap::new()),
            transition: Mutex::new(()),
        }
    }

    /// Create a manager that resumes the generation the store last recorded
    /// as current
    pub async fn restore(store: Arc<dyn ResourceStore>) -> Result<Self> {
        let current = store.load_current().await?;
        let manager = Self::new(store);

        if let Some(tag) = current {
            info!("Resuming generation {}", tag);
            manager
                .states
                .write()
                .await
                .insert(tag.clone(), GenerationState::Active);
            *manager.current.write().await = Some(tag);
        }

        Ok(manager)
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// The current generation tag, if any generation was ever activated
    pub async fn current(&self) -> Option<GenerationTag> {
        self.current.read().await.clone()
    }

    /// Handle to the current generation for reads and writes
    pub async fn current_handle(&self) -> Option<GenerationHandle> {
        self.current().await.map(GenerationHandle::new)
    }

    pub async fn state(&self, tag: &str) -> Option<GenerationState> {
        self.states.read().await.get(tag).copied()
    }

    async fn set_state(&self, tag: &str, state: GenerationState) {
        debug!("Generation {} -> {}", tag, state);
        self.states.write().await.insert(tag.to_string(), state);
    }

    /// Populate `tag` with every manifest URL.
    ///
    /// All entries are fetched before any is written. If any fetch fails or
    /// returns a non-2xx status nothing is written, and a candidate that is
    /// not the current generation is discarded. Installing the current tag
    /// again refreshes it in place.
    pub async fn install(
        &self,
        tag: &str,
        manifest: &[Url],
        transport: &dyn Transport,
    ) -> Result<InstallReport> {
        let is_current = self.current().await.as_deref() == Some(tag);
        if !is_current {
            self.set_state(tag, GenerationState::Installing).await;
        }

        info!("Installing generation {} ({} manifest entries)", tag, manifest.len());

        let mut urls: Vec<&Url> = Vec::with_capacity(manifest.len());
        for url in manifest {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }

        let fetched = match try_join_all(urls.iter().map(|url| fetch_manifest_entry(tag, url, transport))).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("{}", e);
                self.abandon(tag, is_current).await;
                return Err(e);
            }
        };

        {
            // Held across commit and the state change so an activation
            // cannot evict the candidate in between
            let _transition = self.transition.lock().await;

            if let Err(e) = self.commit(tag, fetched).await {
                warn!("Failed to write generation {}: {}", tag, e);
                self.abandon(tag, is_current).await;
                return Err(OfflineError::InstallError {
                    tag: tag.to_string(),
                    url: String::new(),
                    reason: e.to_string(),
                });
            }

            if !is_current {
                self.set_state(tag, GenerationState::Installed).await;
            }
        }
        info!("Generation {} installed", tag);

        Ok(InstallReport {
            tag: tag.to_string(),
            entries: urls.len(),
        })
    }

    async fn commit(&self, tag: &str, fetched: Vec<(ResourceKey, Response)>) -> Result<()> {
        let handle = self.store.open(tag).await?;
        for (key, response) in fetched {
            self.store.put(&handle, key, response).await?;
        }
        Ok(())
    }

    /// Drop a failed candidate. The current generation is never touched.
    async fn abandon(&self, tag: &str, is_current: bool) {
        if is_current {
            return;
        }
        self.states.write().await.remove(tag);
        match self.store.discard(tag).await {
            Ok(true) => debug!("Discarded candidate generation {}", tag),
            Ok(false) => {}
            Err(e) => warn!("Failed to discard candidate generation {}: {}", tag, e),
        }
    }

    /// Make `tag` current, then delete every other generation.
    ///
    /// Activating the current tag is a no-op. A failed eviction is logged
    /// and reported; serving continues from the new generation.
    pub async fn activate(&self, tag: &str) -> Result<ActivationReport> {
        let _transition = self.transition.lock().await;

        let previous = self.current().await;
        if previous.as_deref() == Some(tag) {
            debug!("Generation {} already current", tag);
            return Ok(ActivationReport {
                tag: tag.to_string(),
                previous,
                evicted: 0,
                already_current: true,
                eviction_error: None,
            });
        }

        if self.state(tag).await != Some(GenerationState::Installed) {
            return Err(OfflineError::ActivationError(format!(
                "generation '{}' has not been installed",
                tag
            )));
        }

        if !self.store.generations().await?.iter().any(|t| t == tag) {
            self.states.write().await.remove(tag);
            return Err(OfflineError::ActivationError(format!(
                "generation '{}' was evicted before activation",
                tag
            )));
        }

        *self.current.write().await = Some(tag.to_string());
        self.set_state(tag, GenerationState::Active).await;
        if let Err(e) = self.store.save_current(tag).await {
            warn!("Failed to persist current generation {}: {}", tag, e);
        }
        info!("Generation {} is now current", tag);

        {
            let mut states = self.states.write().await;
            for (other, state) in states.iter_mut() {
                if other != tag && *state == GenerationState::Active {
                    *state = GenerationState::Superseded;
                }
            }
        }

        let (evicted, eviction_error) = match self.store.delete_except(tag).await {
            Ok(count) => {
                // Evicted candidates must be reinstalled before activation
                self.states.write().await.retain(|t, _| t == tag);
                info!("Evicted {} stale generation(s)", count);
                (count, None)
            }
            Err(e) => {
                warn!("Failed to evict stale generations, will retry on next activation: {}", e);
                (0, Some(e.to_string()))
            }
        };

        Ok(ActivationReport {
            tag: tag.to_string(),
            previous,
            evicted,
            already_current: false,
            eviction_error,
        })
    }
}

async fn fetch_manifest_entry(
    tag: &str,
    url: &Url,
    transport: &dyn Transport,
) -> Result<(ResourceKey, Response)> {
    let request = Request::get(url.clone());
    let install_error = |reason: String| OfflineError::InstallError {
        tag: tag.to_string(),
        url: url.to_string(),
        reason,
    };

    let response = transport
        .fetch(&request)
        .await
        .map_err(|e| install_error(e.to_string()))?;

    if !response.is_success() {
        return Err(install_error(format!("status {}", response.status)));
    }

    debug!("Fetched manifest entry {}", url);
    Ok((ResourceKey::from_request(&request), response))
}
