//! Error types for offline cache operations
//!
//! Storage and transport failures are recovered inside the fetch path and
//! never reach the caller of `FetchCoordinator::handle`. Install and
//! activation failures surface to whoever drives the lifecycle.

use thiserror::Error;

/// Main error type for the offline cache
#[derive(Error, Debug)]
pub enum OfflineError {
    /// Store I/O failure (disk, quota, corrupted entry)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Response rejected by the store because its status is outside 2xx
    #[error("Response with status {status} is not cacheable")]
    NotCacheable { status: u16 },

    /// Write or read against a generation that is not open
    #[error("Generation '{0}' is not open")]
    GenerationClosed(String),

    /// Network failure, timeout, DNS error, unresolvable host
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A manifest entry could not be fetched while installing a generation
    #[error("Install of generation '{tag}' failed at {url}: {reason}")]
    InstallError {
        tag: String,
        url: String,
        reason: String,
    },

    /// Activation could not be carried out
    #[error("Activation error: {0}")]
    ActivationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for offline cache operations
pub type Result<T> = std::result::Result<T, OfflineError>;

impl OfflineError {
    /// True for failures of the backing store
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            OfflineError::StorageError(_) | OfflineError::GenerationClosed(_)
        )
    }

    /// True for failures of the live transport
    pub fn is_transport(&self) -> bool {
        matches!(self, OfflineError::TransportError(_))
    }
}

impl From<std::io::Error> for OfflineError {
    fn from(e: std::io::Error) -> Self {
        OfflineError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for OfflineError {
    fn from(e: serde_json::Error) -> Self {
        OfflineError::SerializationError(e.to_string())
    }
}

impl From<String> for OfflineError {
    fn from(s: String) -> Self {
        OfflineError::Other(s)
    }
}

impl From<&str> for OfflineError {
    fn from(s: &str) -> Self {
        OfflineError::Other(s.to_string())
    }
}
