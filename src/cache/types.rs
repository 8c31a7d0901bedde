//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque name of a cache generation, e.g. "v1"
pub type GenerationTag = String;

/// Counters kept by the fetch coordinator
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FetchStats {
    /// Responses served straight from the network
    pub network: u64,

    /// Transport failures answered from the store
    pub cache_fallbacks: u64,

    /// Transport failures answered with the offline document
    pub offline_pages: u64,

    /// Transport failures answered with a synthesized 503
    pub unavailable: u64,

    /// Requests that bypassed the store entirely
    pub passthrough: u64,

    /// Detached writes that landed in the store
    pub writes: u64,

    /// Detached writes that failed (logged and dropped)
    pub write_failures: u64,
}

impl FetchStats {
    /// Requests that went through the caching policy
    pub fn total_handled(&self) -> u64 {
        self.network + self.failed_fetches()
    }

    /// Live fetches that failed at the transport
    pub fn failed_fetches(&self) -> u64 {
        self.cache_fallbacks + self.offline_pages + self.unavailable
    }

    /// Share of failed fetches answered from the store, as a percentage
    pub fn fallback_rate(&self) -> f64 {
        let failed = self.failed_fetches();
        if failed == 0 {
            0.0
        } else {
            (self.cache_fallbacks + self.offline_pages) as f64 / failed as f64 * 100.0
        }
    }
}

impl fmt::Display for FetchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FetchStats {{ network: {}, fallbacks: {}, offline_pages: {}, unavailable: {}, passthrough: {}, writes: {}, write_failures: {} }}",
            self.network,
            self.cache_fallbacks,
            self.offline_pages,
            self.unavailable,
            self.passthrough,
            self.writes,
            self.write_failures
        )
    }
}

/// Lifecycle of a single generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationState {
    /// Manifest is being fetched
    Installing,

    /// Manifest fully written, waiting to be activated
    Installed,

    /// The one generation reads and writes go to
    Active,

    /// Replaced by a newer generation; deleted during activation
    Superseded,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationState::Installing => write!(f, "installing"),
            GenerationState::Installed => write!(f, "installed"),
            GenerationState::Active => write!(f, "active"),
            GenerationState::Superseded => write!(f, "superseded"),
        }
    }
}
