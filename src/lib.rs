//! # Ouroboros Offline (ouroboros-offline)
//!
//! Network-first resource cache with offline fallback, pinned to one named
//! generation at a time.
//!
//! ## Features
//!
//! - Network-first fetching: one live attempt, then the stored copy
//! - Offline document for page loads that miss both network and cache
//! - Generations: a release installs its precache manifest all-or-nothing,
//!   then activation makes it current and deletes every older generation
//! - Deferred activation until old consumers release, or forced through a
//!   `SKIP_WAITING` control message
//! - In-memory and filesystem store backends
//!
//! ## Serving Requests
//!
//! ```no_run
//! use ouroboros_offline::{
//!     ActivationController, FetchCoordinator, GenerationManager, HttpTransport,
//!     MemoryStore, OfflineConfig, Request,
//! };
//! use std::sync::Arc;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OfflineConfig::builder()
//!         .generation_tag("v1")
//!         .base_url(Url::parse("https://example.com/")?)
//!         .build();
//!
//!     let transport = Arc::new(HttpTransport::with_timeout(config.fetch_timeout())?);
//!     let generations = Arc::new(GenerationManager::new(Arc::new(MemoryStore::new())));
//!
//!     let controller =
//!         ActivationController::new(generations.clone(), transport.clone(), config.clone()).await;
//!     controller.run().await?;
//!
//!     let coordinator =
//!         FetchCoordinator::new(transport, generations, &config.offline_document_url()?);
//!     let response = coordinator
//!         .handle(&Request::navigate(Url::parse("https://example.com/")?))
//!         .await;
//!     println!("{} {}", response.status, response.status_text);
//!     Ok(())
//! }
//! ```
//!
//! ## Forcing Activation
//!
//! ```no_run
//! # use ouroboros_offline::ActivationController;
//! # async fn example(controller: &ActivationController) -> anyhow::Result<()> {
//! controller.handle_message(r#"{"type": "SKIP_WAITING"}"#).await?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod transport;

// Re-export main types for convenience
pub use activation::{ActivationController, ConsumerLease, ControlMessage, LifecycleState};
pub use cache::{
    ActivationReport, CacheEntry, DiskStore, EntryMetadata, FetchStats, GenerationHandle,
    GenerationManager, GenerationState, GenerationTag, InstallReport, MemoryStore, ResourceStore,
};
pub use config::{OfflineConfig, OfflineConfigBuilder};
pub use error::{OfflineError, Result};
pub use fetch::FetchCoordinator;
pub use http::{Request, RequestMode, ResourceKey, Response};
pub use transport::{HttpTransport, Transport};
