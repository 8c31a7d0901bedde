//! Network-first request handling with fallback to the current generation

use crate::cache::{
    generation::GenerationManager,
    store::GenerationHandle,
    types::FetchStats,
};
use crate::error::OfflineError;
use crate::http::{Request, ResourceKey, Response};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// Per-request policy:
///
/// 1. Non-GET or non-http(s) requests go straight to the transport; the
///    store is never read or written.
/// 2. Otherwise one live fetch is attempted. Whatever status comes back is
///    returned; a 200 is also copied into the current generation by a
///    detached task.
/// 3. On transport failure the current generation is consulted, then the
///    offline document for navigations, then a plain-text 503.
///
/// `handle` always yields a response.
pub struct FetchCoordinator {
    transport: Arc<dyn Transport>,
    generations: Arc<GenerationManager>,
    offline_key: ResourceKey,
    stats: Arc<RwLock<FetchStats>>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl FetchCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        generations: Arc<GenerationManager>,
        offline_url: &Url,
    ) -> Self {
        Self {
            transport,
            generations,
            offline_key: ResourceKey::get(offline_url),
            stats: Arc::new(RwLock::new(FetchStats::default())),
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn generations(&self) -> &Arc<GenerationManager> {
        &self.generations
    }

    pub async fn handle(&self, request: &Request) -> Response {
        if !request.is_cacheable() {
            return self.passthrough(request).await;
        }

        let key = ResourceKey::from_request(request);

        match self.transport.fetch(request).await {
            Ok(response) => {
                if response.status == 200 {
                    self.spawn_write(key, response.clone()).await;
                }
                self.stats.write().await.network += 1;
                response
            }
            Err(e) => {
                if e.is_transport() {
                    debug!("Live fetch of {} failed, falling back: {}", key, e);
                } else {
                    warn!("Live fetch of {} failed unexpectedly, falling back: {}", key, e);
                }
                self.fallback(request, &key).await
            }
        }
    }

    async fn passthrough(&self, request: &Request) -> Response {
        debug!("Passing through {} {}", request.method, request.url);
        self.stats.write().await.passthrough += 1;

        match self.transport.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Passthrough {} {} failed: {}", request.method, request.url, e);
                Response::service_unavailable()
            }
        }
    }

    async fn fallback(&self, request: &Request, key: &ResourceKey) -> Response {
        let handle = self.generations.current_handle().await;

        if let Some(handle) = &handle {
            if let Some(stored) = self.lookup(handle, key).await {
                self.stats.write().await.cache_fallbacks += 1;
                return stored;
            }

            if request.is_navigation() {
                if let Some(offline) = self.lookup(handle, &self.offline_key).await {
                    debug!("Serving offline document for {}", key);
                    self.stats.write().await.offline_pages += 1;
                    return offline;
                }
            }
        }

        self.stats.write().await.unavailable += 1;
        Response::service_unavailable()
    }

    /// Store errors read as misses
    async fn lookup(&self, handle: &GenerationHandle, key: &ResourceKey) -> Option<Response> {
        match self.generations.store().get(handle, key).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Cache read of {} failed, treating as miss: {}", key, e);
                None
            }
        }
    }

    /// Fire-and-forget copy into the current generation. Failures only
    /// show up in logs and stats.
    async fn spawn_write(&self, key: ResourceKey, response: Response) {
        let Some(handle) = self.generations.current_handle().await else {
            debug!("No current generation, not caching {}", key);
            return;
        };

        let store = Arc::clone(self.generations.store());
        let stats = Arc::clone(&self.stats);

        let task = tokio::spawn(async move {
            match store.put(&handle, key.clone(), response).await {
                Ok(()) => stats.write().await.writes += 1,
                Err(OfflineError::GenerationClosed(tag)) => {
                    debug!("Generation {} evicted before {} was written", tag, key);
                    stats.write().await.write_failures += 1;
                }
                Err(e) if e.is_storage() => {
                    warn!("Failed to cache {}: {}", key, e);
                    stats.write().await.write_failures += 1;
                }
                Err(e) => {
                    debug!("Not caching {}: {}", key, e);
                    stats.write().await.write_failures += 1;
                }
            }
        });

        let mut pending = self.pending_writes.lock().await;
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }

    /// Wait for every detached write started so far
    pub async fn flush_writes(&self) {
        let pending = std::mem::take(&mut *self.pending_writes.lock().await);
        for task in pending {
            if let Err(e) = task.await {
                warn!("Cache write task failed: {}", e);
            }
        }
    }

    pub async fn stats(&self) -> FetchStats {
        self.stats.read().await.clone()
    }
}
