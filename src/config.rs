//! Configuration for the offline cache
//!
//! A deployment supplies two things: the generation tag, bumped by hand on
//! every release, and the precache manifest. Everything else has defaults.

use crate::error::{OfflineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Configuration for the offline cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfflineConfig {
    /// Name of the generation this release installs
    pub generation_tag: String,

    /// Origin that relative manifest entries resolve against
    pub base_url: Url,

    /// Resources eagerly cached when the generation is installed
    pub manifest_entries: Vec<String>,

    /// Document served to navigations when both network and cache miss.
    /// Must be one of the manifest entries.
    pub offline_url: String,

    /// Root directory for the durable store; the CLI uses `.offline-cache`
    /// when unset
    pub cache_dir: Option<PathBuf>,

    /// Timeout applied by the HTTP transport, none by default
    pub fetch_timeout_secs: Option<u64>,

    /// Activate right after install instead of waiting for consumers
    pub skip_waiting_on_install: bool,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            generation_tag: "v1".to_string(),
            base_url: Url::parse("http://localhost/").expect("static url parses"),
            manifest_entries: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/404.html".to_string(),
            ],
            offline_url: "/index.html".to_string(),
            cache_dir: None,
            fetch_timeout_secs: None,
            skip_waiting_on_install: false,
        }
    }
}

impl OfflineConfig {
    /// Create a new builder for the configuration
    pub fn builder() -> OfflineConfigBuilder {
        OfflineConfigBuilder::default()
    }

    /// Load from environment variables, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = Self::builder();

        if let Ok(tag) = std::env::var("OFFLINE_GENERATION_TAG") {
            builder = builder.generation_tag(tag);
        }
        if let Ok(base) = std::env::var("OFFLINE_BASE_URL") {
            let url = Url::parse(&base)
                .map_err(|e| OfflineError::ConfigError(format!("OFFLINE_BASE_URL: {}", e)))?;
            builder = builder.base_url(url);
        }
        if let Ok(manifest) = std::env::var("OFFLINE_MANIFEST") {
            let entries = manifest
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            builder = builder.manifest_entries(entries);
        }
        if let Ok(offline) = std::env::var("OFFLINE_URL") {
            builder = builder.offline_url(offline);
        }
        if let Ok(dir) = std::env::var("OFFLINE_CACHE_DIR") {
            builder = builder.cache_dir(dir);
        }
        if let Ok(secs) = std::env::var("OFFLINE_FETCH_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                OfflineError::ConfigError(format!("OFFLINE_FETCH_TIMEOUT_SECS: invalid value '{}'", secs))
            })?;
            builder = builder.fetch_timeout(Duration::from_secs(secs));
        }
        if let Ok(flag) = std::env::var("OFFLINE_SKIP_WAITING") {
            builder = builder.skip_waiting_on_install(matches!(
                flag.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            ));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Load the deploy-time JSON document, e.g.
    /// `{"generationTag": "v2", "manifestEntries": ["/", "/app.css"]}`
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OfflineError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.generation_tag.trim().is_empty() {
            return Err(OfflineError::ConfigError(
                "generation_tag must not be empty".to_string(),
            ));
        }

        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(OfflineError::ConfigError(format!(
                "base_url must be http or https, got '{}'",
                self.base_url
            )));
        }

        let manifest = self.manifest_urls()?;
        let offline = self.offline_document_url()?;
        if !manifest.contains(&offline) {
            return Err(OfflineError::ConfigError(format!(
                "offline_url '{}' is not listed in the manifest",
                self.offline_url
            )));
        }

        if self.fetch_timeout_secs == Some(0) {
            return Err(OfflineError::ConfigError(
                "fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Manifest entries resolved to absolute URLs, in manifest order
    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        self.manifest_entries
            .iter()
            .map(|entry| self.resolve(entry))
            .collect()
    }

    /// Absolute URL of the offline document
    pub fn offline_document_url(&self) -> Result<Url> {
        self.resolve(&self.offline_url)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    fn resolve(&self, entry: &str) -> Result<Url> {
        self.base_url.join(entry).map_err(|e| {
            OfflineError::ConfigError(format!("invalid manifest entry '{}': {}", entry, e))
        })
    }
}

/// Builder for the offline cache configuration
#[derive(Debug, Default)]
pub struct OfflineConfigBuilder {
    generation_tag: Option<String>,
    base_url: Option<Url>,
    manifest_entries: Option<Vec<String>>,
    offline_url: Option<String>,
    cache_dir: Option<PathBuf>,
    fetch_timeout: Option<Duration>,
    skip_waiting_on_install: Option<bool>,
}

impl OfflineConfigBuilder {
    /// Set the generation tag
    pub fn generation_tag(mut self, tag: impl Into<String>) -> Self {
        self.generation_tag = Some(tag.into());
        self
    }

    /// Set the origin manifest entries resolve against
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Replace the precache manifest
    pub fn manifest_entries(mut self, entries: Vec<String>) -> Self {
        self.manifest_entries = Some(entries);
        self
    }

    /// Set the offline document
    pub fn offline_url(mut self, url: impl Into<String>) -> Self {
        self.offline_url = Some(url.into());
        self
    }

    /// Use a durable store rooted at `dir`
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the transport timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Activate immediately after install
    pub fn skip_waiting_on_install(mut self, skip: bool) -> Self {
        self.skip_waiting_on_install = Some(skip);
        self
    }

    /// Build the configuration
    pub fn build(self) -> OfflineConfig {
        let defaults = OfflineConfig::default();

        OfflineConfig {
            generation_tag: self.generation_tag.unwrap_or(defaults.generation_tag),
            base_url: self.base_url.unwrap_or(defaults.base_url),
            manifest_entries: self.manifest_entries.unwrap_or(defaults.manifest_entries),
            offline_url: self.offline_url.unwrap_or(defaults.offline_url),
            cache_dir: self.cache_dir.or(defaults.cache_dir),
            fetch_timeout_secs: self
                .fetch_timeout
                .map(|d| d.as_secs().max(1))
                .or(defaults.fetch_timeout_secs),
            skip_waiting_on_install: self
                .skip_waiting_on_install
                .unwrap_or(defaults.skip_waiting_on_install),
        }
    }
}
