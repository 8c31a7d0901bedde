//! Durable store backed by the filesystem
//!
//! Layout under the root directory:
//!
//! ```text
//! CURRENT                       current generation tag
//! generations/<tag>/<sha256>.json   one serialized CacheEntry per key
//! ```
//!
//! Entries are written to a temporary file and renamed into place, so a
//! reader sees either the old entry or the new one.

use crate::cache::{
    entry::CacheEntry,
    store::{ensure_cacheable, GenerationHandle, ResourceStore},
    types::GenerationTag,
};
use crate::error::{OfflineError, Result};
use crate::http::{ResourceKey, Response};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const CURRENT_FILE: &str = "CURRENT";
const GENERATIONS_DIR: &str = "generations";

/// Filesystem-backed resource store
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(GENERATIONS_DIR))
            .await
            .map_err(|e| {
                OfflineError::StorageError(format!("creating {}: {}", root.display(), e))
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, tag: &str) -> PathBuf {
        self.root.join(GENERATIONS_DIR).join(tag)
    }

    fn entry_path(&self, tag: &str, key: &ResourceKey) -> PathBuf {
        self.generation_dir(tag)
            .join(format!("{}.json", key_digest(key)))
    }
}

/// Hex SHA-256 of the key's display form
fn key_digest(key: &ResourceKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Tags become directory names, so they must be plain path components
fn validate_tag(tag: &str) -> Result<()> {
    let valid = !tag.is_empty()
        && !tag.starts_with('.')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(OfflineError::StorageError(format!(
            "generation tag '{}' is not usable as a directory name",
            tag
        )))
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| OfflineError::StorageError(format!("no parent for {}", path.display())))?;
    let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ResourceStore for DiskStore {
    async fn open(&self, tag: &str) -> Result<GenerationHandle> {
        validate_tag(tag)?;
        fs::create_dir_all(self.generation_dir(tag)).await?;
        debug!("Opened generation {} at {}", tag, self.generation_dir(tag).display());
        Ok(GenerationHandle::new(tag))
    }

    async fn put(&self, handle: &GenerationHandle, key: ResourceKey, response: Response) -> Result<()> {
        ensure_cacheable(&response)?;

        let dir = self.generation_dir(handle.tag());
        if !fs::try_exists(&dir).await? {
            return Err(OfflineError::GenerationClosed(handle.tag().to_string()));
        }

        let path = self.entry_path(handle.tag(), &key);
        let entry = CacheEntry::new(key, response, handle.tag());
        let bytes = serde_json::to_vec(&entry)?;

        if let Err(e) = write_atomic(&path, &bytes).await {
            // The directory vanished between the check and the rename
            if !fs::try_exists(&dir).await.unwrap_or(false) {
                return Err(OfflineError::GenerationClosed(handle.tag().to_string()));
            }
            return Err(e);
        }

        debug!("Stored {} in generation {}", entry.key, handle.tag());
        Ok(())
    }

    async fn get(&self, handle: &GenerationHandle, key: &ResourceKey) -> Result<Option<Response>> {
        let path = self.entry_path(handle.tag(), key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes)?;
        if &entry.key != key {
            warn!("Digest collision or corrupt entry at {}", path.display());
            return Ok(None);
        }
        Ok(Some(entry.response))
    }

    async fn len(&self, handle: &GenerationHandle) -> Result<usize> {
        let mut dir = match fs::read_dir(self.generation_dir(handle.tag())).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(item) = dir.next_entry().await? {
            if item.path().extension().and_then(|s| s.to_str()) == Some("json") {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn generations(&self) -> Result<Vec<GenerationTag>> {
        let mut dir = match fs::read_dir(self.root.join(GENERATIONS_DIR)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tags = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_dir() {
                if let Some(name) = item.file_name().to_str() {
                    tags.push(name.to_string());
                }
            }
        }
        tags.sort();
        Ok(tags)
    }

    async fn discard(&self, tag: &str) -> Result<bool> {
        validate_tag(tag)?;
        match fs::remove_dir_all(self.generation_dir(tag)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_current(&self) -> Result<Option<GenerationTag>> {
        match fs::read_to_string(self.root.join(CURRENT_FILE)).await {
            Ok(raw) => {
                let tag = raw.trim();
                Ok((!tag.is_empty()).then(|| tag.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_current(&self, tag: &str) -> Result<()> {
        validate_tag(tag)?;
        write_atomic(&self.root.join(CURRENT_FILE), tag.as_bytes()).await
    }
}
