//! Integration tests for the fetch path and generation handling
//!
//! These tests verify:
//! - Network-first responses and detached cache writes
//! - Fallback to the stored copy, the offline document, or a 503
//! - Pass-through of non-GET and non-http requests
//! - All-or-nothing installs and eviction of stale generations

mod common;

use common::{config, site, url, CountingStore, FailingStore, ScriptedTransport};
use ouroboros_offline::{
    DiskStore, FetchCoordinator, GenerationManager, MemoryStore, OfflineError, Request,
    ResourceKey, ResourceStore, Response,
};
use reqwest::Method;
use std::sync::Arc;

const MANIFEST: &[&str] = &["/", "/index.html", "/404.html"];

async fn installed(
    store: Arc<dyn ResourceStore>,
    transport: &Arc<ScriptedTransport>,
    tag: &str,
) -> (Arc<GenerationManager>, FetchCoordinator) {
    let cfg = config(tag, MANIFEST);
    let generations = Arc::new(GenerationManager::new(store));
    generations
        .install(tag, &cfg.manifest_urls().unwrap(), transport.as_ref())
        .await
        .unwrap();
    generations.activate(tag).await.unwrap();

    let coordinator = FetchCoordinator::new(
        transport.clone(),
        generations.clone(),
        &cfg.offline_document_url().unwrap(),
    );
    (generations, coordinator)
}

#[tokio::test]
async fn test_install_twice_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let transport = site();
    let manager = GenerationManager::new(store.clone());
    let manifest = config("v1", MANIFEST).manifest_urls().unwrap();

    manager.install("v1", &manifest, &transport).await.unwrap();
    let handle = store.open("v1").await.unwrap();
    let first: Vec<_> = {
        let mut out = Vec::new();
        for u in &manifest {
            out.push(store.get(&handle, &ResourceKey::get(u)).await.unwrap());
        }
        out
    };

    let report = manager.install("v1", &manifest, &transport).await.unwrap();
    assert_eq!(report.entries, MANIFEST.len());
    assert_eq!(store.generations().await.unwrap(), vec!["v1".to_string()]);
    assert_eq!(store.len(&handle).await.unwrap(), MANIFEST.len());

    for (u, before) in manifest.iter().zip(first) {
        let after = store.get(&handle, &ResourceKey::get(u)).await.unwrap();
        assert_eq!(after, before);
        assert!(after.is_some());
    }
}

#[tokio::test]
async fn test_exactly_one_current_generation() {
    let store = Arc::new(MemoryStore::new());
    let transport = site();
    let manager = GenerationManager::new(store.clone());
    let manifest = config("v1", MANIFEST).manifest_urls().unwrap();

    manager.install("v1", &manifest, &transport).await.unwrap();
    manager.activate("v1").await.unwrap();
    manager.install("v2", &manifest, &transport).await.unwrap();

    // Installed but not activated: still one current
    assert_eq!(manager.current().await, Some("v1".to_string()));

    manager.activate("v2").await.unwrap();
    assert_eq!(manager.current().await, Some("v2".to_string()));
    assert_eq!(store.generations().await.unwrap(), vec!["v2".to_string()]);

    // Evicting around the current tag never removes it
    assert_eq!(store.delete_except("v2").await.unwrap(), 0);
    assert_eq!(store.generations().await.unwrap(), vec!["v2".to_string()]);
}

#[tokio::test]
async fn test_fallback_returns_stored_bytes() {
    let transport = Arc::new(site());
    let store = Arc::new(MemoryStore::new());
    let (generations, coordinator) = installed(store.clone(), &transport, "v1").await;

    let request = Request::get(url("/css/app.css"));
    let live = coordinator.handle(&request).await;
    assert_eq!(live.status, 200);
    coordinator.flush_writes().await;

    transport.set_offline(true);
    let fallback = coordinator.handle(&request).await;
    assert_eq!(fallback, live);
    assert_eq!(fallback.header("content-type"), Some("text/css"));

    // Directly stored entries are served the same way
    let handle = generations.current_handle().await.unwrap();
    let stored = Response::new(200, vec![0u8, 159, 146, 150]).with_header("Content-Type", "font/woff2");
    store
        .put(&handle, ResourceKey::get(&url("/fonts/a.woff2")), stored.clone())
        .await
        .unwrap();
    assert_eq!(coordinator.handle(&Request::get(url("/fonts/a.woff2"))).await, stored);
}

#[tokio::test]
async fn test_navigation_fallback_serves_offline_document() {
    let transport = Arc::new(site());
    let (_, coordinator) = installed(Arc::new(MemoryStore::new()), &transport, "v1").await;
    transport.set_offline(true);

    let response = coordinator
        .handle(&Request::navigate(url("/blog/never-visited")))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_ref(), b"<h1>offline ready</h1>");
}

#[tokio::test]
async fn test_subresource_fallback_is_503() {
    let transport = Arc::new(site());
    let (_, coordinator) = installed(Arc::new(MemoryStore::new()), &transport, "v1").await;
    transport.set_offline(true);

    let response = coordinator.handle(&Request::get(url("/js/app.js"))).await;

    assert_eq!(response.status, 503);
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
    assert!(!response.body.is_empty());

    let stats = coordinator.stats().await;
    assert_eq!(stats.unavailable, 1);
}

#[tokio::test]
async fn test_non_get_never_touches_store() {
    let transport = Arc::new(site());
    transport.serve("/api/submit", Response::new(200, "ok"));
    let store = Arc::new(CountingStore::default());
    let (_, coordinator) = installed(store.clone(), &transport, "v1").await;

    let gets = store.gets();
    let puts = store.puts();

    let request = Request::new(Method::POST, url("/api/submit")).with_body("name=x");
    assert_eq!(coordinator.handle(&request).await.status, 200);
    coordinator.flush_writes().await;

    transport.set_offline(true);
    assert_eq!(coordinator.handle(&request).await.status, 503);

    assert_eq!(store.gets(), gets);
    assert_eq!(store.puts(), puts);
    assert_eq!(coordinator.stats().await.passthrough, 2);
}

#[tokio::test]
async fn test_non_http_scheme_passes_through() {
    let transport = Arc::new(site());
    let store = Arc::new(CountingStore::default());
    let (_, coordinator) = installed(store.clone(), &transport, "v1").await;
    let puts = store.puts();

    let request = Request::get(url::Url::parse("chrome-extension://abcdef/content.js").unwrap());
    let response = coordinator.handle(&request).await;
    coordinator.flush_writes().await;

    assert_eq!(response.status, 404);
    assert_eq!(store.puts(), puts);
}

#[tokio::test]
async fn test_error_status_returned_but_not_cached() {
    let transport = Arc::new(site());
    transport.serve("/flaky.json", Response::new(500, "boom"));
    let (_, coordinator) = installed(Arc::new(MemoryStore::new()), &transport, "v1").await;

    let response = coordinator.handle(&Request::get(url("/flaky.json"))).await;
    assert_eq!(response.status, 500);
    coordinator.flush_writes().await;
    assert_eq!(coordinator.stats().await.writes, 0);

    transport.set_offline(true);
    assert_eq!(coordinator.handle(&Request::get(url("/flaky.json"))).await.status, 503);
}

#[tokio::test]
async fn test_failed_install_leaves_current_untouched() {
    let transport = Arc::new(site());
    let store = Arc::new(MemoryStore::new());
    let (generations, coordinator) = installed(store.clone(), &transport, "v1").await;

    transport.serve_text("/index.html", "<h1>v2 offline</h1>");
    transport.fail("/404.html");

    let manifest = config("v2", MANIFEST).manifest_urls().unwrap();
    let result = generations.install("v2", &manifest, transport.as_ref()).await;
    assert!(matches!(result, Err(OfflineError::InstallError { .. })));
    assert!(generations.activate("v2").await.is_err());

    assert_eq!(generations.current().await, Some("v1".to_string()));
    assert_eq!(store.generations().await.unwrap(), vec!["v1".to_string()]);

    // Retrying the current tag with a broken manifest does not disturb it either
    let result = generations.install("v1", &manifest, transport.as_ref()).await;
    assert!(result.is_err());

    transport.set_offline(true);
    let response = coordinator.handle(&Request::navigate(url("/anything"))).await;
    assert_eq!(response.body.as_ref(), b"<h1>offline ready</h1>");
}

#[tokio::test]
async fn test_non_success_manifest_entry_fails_install() {
    let transport = site();
    let manager = GenerationManager::new(Arc::new(MemoryStore::new()));
    let manifest = config("v1", &["/", "/missing.css"]).manifest_urls().unwrap();

    let result = manager.install("v1", &manifest, &transport).await;
    match result {
        Err(OfflineError::InstallError { url, reason, .. }) => {
            assert!(url.ends_with("/missing.css"));
            assert!(reason.contains("404"));
        }
        other => panic!("expected install error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_activation_evicts_previous_generation() {
    let transport = Arc::new(site());
    let store = Arc::new(MemoryStore::new());
    let (generations, coordinator) = installed(store.clone(), &transport, "v1").await;

    coordinator.handle(&Request::get(url("/css/app.css"))).await;
    coordinator.flush_writes().await;

    let v1 = store.open("v1").await.unwrap();
    let keys: Vec<ResourceKey> = ["/", "/index.html", "/404.html", "/css/app.css"]
        .iter()
        .map(|p| ResourceKey::get(&url(p)))
        .collect();
    for key in &keys {
        assert!(store.get(&v1, key).await.unwrap().is_some());
    }

    let manifest = config("v2", MANIFEST).manifest_urls().unwrap();
    generations.install("v2", &manifest, transport.as_ref()).await.unwrap();
    let report = generations.activate("v2").await.unwrap();
    assert_eq!(report.evicted, 1);

    let v2 = store.open("v2").await.unwrap();
    for key in &keys {
        assert!(store.get(&v1, key).await.unwrap().is_none());
    }
    for key in &keys[..3] {
        assert!(store.get(&v2, key).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_reads_stay_on_current_until_activation() {
    let transport = Arc::new(site());
    let (generations, coordinator) = installed(Arc::new(MemoryStore::new()), &transport, "v1").await;

    transport.serve_text("/index.html", "<h1>v2 offline</h1>");
    let manifest = config("v2", MANIFEST).manifest_urls().unwrap();
    generations.install("v2", &manifest, transport.as_ref()).await.unwrap();

    transport.set_offline(true);
    let before = coordinator.handle(&Request::navigate(url("/x"))).await;
    assert_eq!(before.body.as_ref(), b"<h1>offline ready</h1>");

    generations.activate("v2").await.unwrap();
    let after = coordinator.handle(&Request::navigate(url("/x"))).await;
    assert_eq!(after.body.as_ref(), b"<h1>v2 offline</h1>");
}

#[tokio::test]
async fn test_exactly_one_live_attempt_per_request() {
    let transport = Arc::new(site());
    let (_, coordinator) = installed(Arc::new(MemoryStore::new()), &transport, "v1").await;
    transport.set_offline(true);

    let before = transport.calls();
    coordinator.handle(&Request::get(url("/css/app.css"))).await;
    assert_eq!(transport.calls(), before + 1);
}

#[tokio::test]
async fn test_disk_store_end_to_end() {
    let tmp = tempfile::TempDir::new().unwrap();
    let transport = Arc::new(site());

    {
        let store = Arc::new(DiskStore::new(tmp.path()).await.unwrap());
        let (_, coordinator) = installed(store, &transport, "v1").await;
        coordinator.handle(&Request::get(url("/images/logo.svg"))).await;
        coordinator.flush_writes().await;
    }

    // A new process resumes the persisted generation
    let store: Arc<dyn ResourceStore> = Arc::new(DiskStore::new(tmp.path()).await.unwrap());
    let generations = Arc::new(GenerationManager::restore(store).await.unwrap());
    assert_eq!(generations.current().await, Some("v1".to_string()));

    let coordinator = FetchCoordinator::new(
        transport.clone(),
        generations,
        &config("v1", MANIFEST).offline_document_url().unwrap(),
    );
    transport.set_offline(true);

    let logo = coordinator.handle(&Request::get(url("/images/logo.svg"))).await;
    assert_eq!(logo.status, 200);
    assert_eq!(logo.body.as_ref(), b"<svg/>");
    assert_eq!(logo.header("Content-Type"), Some("image/svg+xml"));
}

#[tokio::test]
async fn test_store_read_error_is_treated_as_miss() {
    let transport = Arc::new(site());
    let store = Arc::new(FailingStore::default());
    let (_, coordinator) = installed(store.clone(), &transport, "v1").await;

    coordinator.handle(&Request::get(url("/css/app.css"))).await;
    coordinator.flush_writes().await;

    store.break_reads_of("/");
    store.break_reads_of("/css/app.css");
    transport.set_offline(true);

    // The stored page cannot be read, so the offline document stands in
    let page = coordinator.handle(&Request::navigate(url("/"))).await;
    assert_eq!(page.status, 200);
    assert_eq!(page.body.as_ref(), b"<h1>offline ready</h1>");

    let stylesheet = coordinator.handle(&Request::get(url("/css/app.css"))).await;
    assert_eq!(stylesheet.status, 503);

    let stats = coordinator.stats().await;
    assert_eq!(stats.offline_pages, 1);
    assert_eq!(stats.unavailable, 1);
}

#[tokio::test]
async fn test_store_write_error_leaves_live_response_intact() {
    let transport = Arc::new(site());
    let store = Arc::new(FailingStore::default());
    let (generations, coordinator) = installed(store.clone(), &transport, "v1").await;
    store.set_fail_puts(true);

    let response = coordinator.handle(&Request::get(url("/images/logo.svg"))).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_ref(), b"<svg/>");
    assert_eq!(response.header("Content-Type"), Some("image/svg+xml"));
    coordinator.flush_writes().await;

    let stats = coordinator.stats().await;
    assert_eq!(stats.network, 1);
    assert_eq!(stats.writes, 0);
    assert_eq!(stats.write_failures, 1);

    let handle = generations.current_handle().await.unwrap();
    let key = ResourceKey::get(&url("/images/logo.svg"));
    assert!(store.get(&handle, &key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_eviction_keeps_new_generation_and_retries() {
    let transport = Arc::new(site());
    let store = Arc::new(FailingStore::default());
    let (generations, _) = installed(store.clone(), &transport, "v1").await;

    let manifest = config("v2", MANIFEST).manifest_urls().unwrap();
    generations.install("v2", &manifest, transport.as_ref()).await.unwrap();

    store.set_fail_evictions(true);
    let report = generations.activate("v2").await.unwrap();
    assert!(report.eviction_error.is_some());
    assert_eq!(report.evicted, 0);
    assert_eq!(generations.current().await, Some("v2".to_string()));
    assert_eq!(store.load_current().await.unwrap(), Some("v2".to_string()));
    assert_eq!(
        store.generations().await.unwrap(),
        vec!["v1".to_string(), "v2".to_string()]
    );

    // The next activation clears what the failed one left behind
    store.set_fail_evictions(false);
    let manifest = config("v3", MANIFEST).manifest_urls().unwrap();
    generations.install("v3", &manifest, transport.as_ref()).await.unwrap();
    let report = generations.activate("v3").await.unwrap();
    assert!(report.eviction_error.is_none());
    assert_eq!(report.evicted, 2);
    assert_eq!(store.generations().await.unwrap(), vec!["v3".to_string()]);
}
