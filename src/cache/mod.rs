//! # Generation-Scoped Resource Cache
//!
//! Stores response payloads grouped into named generations. One generation
//! is current; a release installs a new generation from its precache
//! manifest and, once activated, every other generation is deleted.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: in-process, lost on exit
//! - [`DiskStore`]: one directory per generation, survives restarts
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_offline::cache::{MemoryStore, ResourceStore};
//! use ouroboros_offline::http::{ResourceKey, Response};
//! use url::Url;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = MemoryStore::new();
//! let handle = store.open("v1").await?;
//!
//! let key = ResourceKey::get(&Url::parse("https://example.com/app.css")?);
//! store.put(&handle, key.clone(), Response::new(200, "body {}")).await?;
//!
//! if let Some(response) = store.get(&handle, &key).await? {
//!     println!("Cached: {} bytes", response.body.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod disk;
pub mod entry;
pub mod generation;
pub mod store;
pub mod types;

pub use disk::DiskStore;
pub use entry::{CacheEntry, EntryMetadata};
pub use generation::{ActivationReport, GenerationManager, InstallReport};
pub use store::{GenerationHandle, MemoryStore, ResourceStore};
pub use types::{FetchStats, GenerationState, GenerationTag};
