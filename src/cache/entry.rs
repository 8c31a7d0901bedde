//! Stored entries: a response payload keyed by resource identity

use crate::http::{ResourceKey, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A response held in one generation of the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The resource key
    pub key: ResourceKey,

    /// The stored response
    pub response: Response,

    /// Entry metadata
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Create a new entry stamped with the current time
    pub fn new(key: ResourceKey, response: Response, generation: impl Into<String>) -> Self {
        let size_bytes = Self::payload_size(&key, &response);

        Self {
            key,
            response,
            metadata: EntryMetadata {
                generation: generation.into(),
                stored_at: Utc::now(),
                size_bytes,
            },
        }
    }

    /// Approximate size: key + headers + body
    fn payload_size(key: &ResourceKey, response: &Response) -> usize {
        let headers: usize = response
            .headers
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
        key.url.len() + key.method.len() + headers + response.body.len()
    }
}

/// Metadata associated with a stored entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Generation the entry was written into
    pub generation: String,

    /// Write time; a later successful fetch overwrites it
    pub stored_at: DateTime<Utc>,

    /// Size of the entry in bytes
    pub size_bytes: usize,
}
