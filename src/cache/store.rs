//! Generation-scoped resource store
//!
//! The store maps a resource key to a response payload inside a named
//! generation. Exactly one generation is current at a time; the
//! `GenerationManager` decides which, the store only keeps the bytes.

use crate::cache::{entry::CacheEntry, types::GenerationTag};
use crate::error::{OfflineError, Result};
use crate::http::{ResourceKey, Response};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Handle to an open generation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationHandle {
    tag: GenerationTag,
}

impl GenerationHandle {
    pub(crate) fn new(tag: impl Into<GenerationTag>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Backing storage for cached responses
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Open a generation, creating it if absent. Idempotent.
    async fn open(&self, tag: &str) -> Result<GenerationHandle>;

    /// Write `response` under `key`, replacing any previous entry.
    /// Rejects non-2xx responses and generations that are no longer open.
    async fn put(&self, handle: &GenerationHandle, key: ResourceKey, response: Response) -> Result<()>;

    /// Look up a stored response. A missing generation reads as a miss.
    async fn get(&self, handle: &GenerationHandle, key: &ResourceKey) -> Result<Option<Response>>;

    /// Number of entries in a generation
    async fn len(&self, handle: &GenerationHandle) -> Result<usize>;

    /// Tags of every open generation
    async fn generations(&self) -> Result<Vec<GenerationTag>>;

    /// Delete a single generation and all its entries
    async fn discard(&self, tag: &str) -> Result<bool>;

    /// Persisted current-generation register
    async fn load_current(&self) -> Result<Option<GenerationTag>>;

    async fn save_current(&self, tag: &str) -> Result<()>;

    /// Delete every generation except `current`, returning how many went
    async fn delete_except(&self, current: &str) -> Result<usize> {
        let mut deleted = 0;
        for tag in self.generations().await? {
            if tag == current {
                continue;
            }
            if self.discard(&tag).await? {
                info!("Cleared stale generation: {}", tag);
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

pub(crate) fn ensure_cacheable(response: &Response) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(OfflineError::NotCacheable {
            status: response.status,
        })
    }
}

/// In-process store; contents live as long as the value
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    generations: HashMap<GenerationTag, HashMap<ResourceKey, CacheEntry>>,
    current: Option<GenerationTag>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full entry including metadata, for inspection
    pub async fn entry(&self, handle: &GenerationHandle, key: &ResourceKey) -> Option<CacheEntry> {
        let inner = self.inner.read().await;
        inner
            .generations
            .get(handle.tag())
            .and_then(|entries| entries.get(key))
            .cloned()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn open(&self, tag: &str) -> Result<GenerationHandle> {
        let mut inner = self.inner.write().await;
        if !inner.generations.contains_key(tag) {
            debug!("Opening new generation: {}", tag);
            inner.generations.insert(tag.to_string(), HashMap::new());
        }
        Ok(GenerationHandle::new(tag))
    }

    async fn put(&self, handle: &GenerationHandle, key: ResourceKey, response: Response) -> Result<()> {
        ensure_cacheable(&response)?;

        let mut inner = self.inner.write().await;
        let entries = inner
            .generations
            .get_mut(handle.tag())
            .ok_or_else(|| OfflineError::GenerationClosed(handle.tag().to_string()))?;

        debug!("Storing {} in generation {}", key, handle.tag());
        let entry = CacheEntry::new(key.clone(), response, handle.tag());
        entries.insert(key, entry);
        Ok(())
    }

    async fn get(&self, handle: &GenerationHandle, key: &ResourceKey) -> Result<Option<Response>> {
        let inner = self.inner.read().await;
        Ok(inner
            .generations
            .get(handle.tag())
            .and_then(|entries| entries.get(key))
            .map(|entry| entry.response.clone()))
    }

    async fn len(&self, handle: &GenerationHandle) -> Result<usize> {
        let inner = self.inner.read().await;
        Ok(inner
            .generations
            .get(handle.tag())
            .map(HashMap::len)
            .unwrap_or(0))
    }

    async fn generations(&self) -> Result<Vec<GenerationTag>> {
        let inner = self.inner.read().await;
        let mut tags: Vec<_> = inner.generations.keys().cloned().collect();
        tags.sort();
        Ok(tags)
    }

    async fn discard(&self, tag: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.generations.remove(tag).is_some())
    }

    async fn load_current(&self) -> Result<Option<GenerationTag>> {
        Ok(self.inner.read().await.current.clone())
    }

    async fn save_current(&self, tag: &str) -> Result<()> {
        self.inner.write().await.current = Some(tag.to_string());
        Ok(())
    }

    async fn delete_except(&self, current: &str) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let before = inner.generations.len();
        inner.generations.retain(|tag, _| {
            let keep = tag == current;
            if !keep {
                info!("Cleared stale generation: {}", tag);
            }
            keep
        });
        Ok(before - inner.generations.len())
    }
}
