//! Live network transport
//!
//! The coordinator makes exactly one call per request and never retries;
//! timeouts belong to the transport.

use crate::error::{OfflineError, Result};
use crate::http::{Request, Response};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Performs live fetches. Any HTTP status is a successful fetch; only a
/// failure to obtain a response at all is an error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(None)
    }

    /// Build a transport whose requests fail after `timeout`
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| OfflineError::ConfigError(format!("building http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        debug!("Fetching {} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let reply = builder
            .send()
            .await
            .map_err(|e| OfflineError::TransportError(e.to_string()))?;

        let status = reply.status();
        let headers = reply
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = reply
            .bytes()
            .await
            .map_err(|e| OfflineError::TransportError(e.to_string()))?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}
