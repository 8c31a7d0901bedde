//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ouroboros_offline::{
    GenerationHandle, MemoryStore, OfflineConfig, OfflineError, Request, ResourceKey,
    ResourceStore, Response, Result, Transport,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

pub const BASE: &str = "https://example.com/";

pub fn url(path: &str) -> Url {
    Url::parse(BASE).unwrap().join(path).unwrap()
}

pub fn config(tag: &str, manifest: &[&str]) -> OfflineConfig {
    OfflineConfig::builder()
        .generation_tag(tag)
        .base_url(Url::parse(BASE).unwrap())
        .manifest_entries(manifest.iter().map(|s| s.to_string()).collect())
        .offline_url("/index.html")
        .build()
}

/// Transport serving a fixed site; can be switched offline or made to
/// fail for individual URLs
#[derive(Default)]
pub struct ScriptedTransport {
    pages: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, path: &str, response: Response) {
        self.pages
            .lock()
            .unwrap()
            .insert(url(path).to_string(), response);
    }

    pub fn serve_text(&self, path: &str, body: &str) {
        self.serve(
            path,
            Response::new(200, body.to_string()).with_header("Content-Type", "text/html"),
        );
    }

    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(url(path).to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let target = request.url.to_string();
        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&target) {
            return Err(OfflineError::TransportError(format!("unreachable: {}", target)));
        }

        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&target)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// Memory store that counts reads and writes
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for CountingStore {
    async fn open(&self, tag: &str) -> Result<GenerationHandle> {
        self.inner.open(tag).await
    }

    async fn put(&self, handle: &GenerationHandle, key: ResourceKey, response: Response) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(handle, key, response).await
    }

    async fn get(&self, handle: &GenerationHandle, key: &ResourceKey) -> Result<Option<Response>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(handle, key).await
    }

    async fn len(&self, handle: &GenerationHandle) -> Result<usize> {
        self.inner.len(handle).await
    }

    async fn generations(&self) -> Result<Vec<String>> {
        self.inner.generations().await
    }

    async fn discard(&self, tag: &str) -> Result<bool> {
        self.inner.discard(tag).await
    }

    async fn load_current(&self) -> Result<Option<String>> {
        self.inner.load_current().await
    }

    async fn save_current(&self, tag: &str) -> Result<()> {
        self.inner.save_current(tag).await
    }
}

/// Memory store with switchable failures: reads of chosen URLs, every
/// write, and eviction
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    broken_reads: Mutex<HashSet<String>>,
    fail_puts: AtomicBool,
    fail_evictions: AtomicBool,
}

impl FailingStore {
    pub fn break_reads_of(&self, path: &str) {
        self.broken_reads.lock().unwrap().insert(url(path).to_string());
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_evictions(&self, fail: bool) {
        self.fail_evictions.store(fail, Ordering::SeqCst);
    }

    fn io_error(what: &str) -> OfflineError {
        OfflineError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("{} denied", what),
        ))
    }
}

#[async_trait]
impl ResourceStore for FailingStore {
    async fn open(&self, tag: &str) -> Result<GenerationHandle> {
        self.inner.open(tag).await
    }

    async fn put(&self, handle: &GenerationHandle, key: ResourceKey, response: Response) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::io_error("write"));
        }
        self.inner.put(handle, key, response).await
    }

    async fn get(&self, handle: &GenerationHandle, key: &ResourceKey) -> Result<Option<Response>> {
        if self.broken_reads.lock().unwrap().contains(&key.url) {
            return Err(Self::io_error("read"));
        }
        self.inner.get(handle, key).await
    }

    async fn len(&self, handle: &GenerationHandle) -> Result<usize> {
        self.inner.len(handle).await
    }

    async fn generations(&self) -> Result<Vec<String>> {
        self.inner.generations().await
    }

    async fn discard(&self, tag: &str) -> Result<bool> {
        if self.fail_evictions.load(Ordering::SeqCst) {
            return Err(Self::io_error("delete"));
        }
        self.inner.discard(tag).await
    }

    async fn load_current(&self) -> Result<Option<String>> {
        self.inner.load_current().await
    }

    async fn save_current(&self, tag: &str) -> Result<()> {
        self.inner.save_current(tag).await
    }

    async fn delete_except(&self, current: &str) -> Result<usize> {
        if self.fail_evictions.load(Ordering::SeqCst) {
            return Err(Self::io_error("delete"));
        }
        self.inner.delete_except(current).await
    }
}

/// A small site with an offline page
pub fn site() -> ScriptedTransport {
    let transport = ScriptedTransport::new();
    transport.serve_text("/", "<h1>home</h1>");
    transport.serve_text("/index.html", "<h1>offline ready</h1>");
    transport.serve_text("/404.html", "<h1>not found</h1>");
    transport.serve(
        "/css/app.css",
        Response::new(200, "body { color: navy; }").with_header("Content-Type", "text/css"),
    );
    transport.serve(
        "/images/logo.svg",
        Response::new(200, "<svg/>").with_header("Content-Type", "image/svg+xml"),
    );
    transport
}
