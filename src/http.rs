//! Request and response types shared by the transport, the store and the
//! fetch coordinator

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// How the request was initiated by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Top-level page load
    Navigate,
    /// Subresource (image, script, stylesheet, XHR)
    #[default]
    Subresource,
}

/// An incoming content request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a GET request for a subresource
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Subresource,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request for a top-level navigation
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Create a request with an arbitrary method
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            ..Self::get(url)
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a request body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Only http/https requests reach the network through the cache
    pub fn is_network_addressable(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// GET over http(s); everything else bypasses the store
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET && self.is_network_addressable()
    }
}

/// A response as returned to the calling layer or kept in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Synthesized reply when neither the network nor the store can serve
    pub fn service_unavailable() -> Self {
        Self::new(503, "Offline - Content not available")
            .with_header("Content-Type", "text/plain")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// Normalized request identity used as the store key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub method: String,
    pub url: String,
}

impl ResourceKey {
    /// Key for a GET of the given URL. Fragments never reach the network
    /// and are dropped.
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::GET.to_string(),
            url: url.to_string(),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        let mut key = Self::get(&request.url);
        key.method = request.method.to_string();
        key
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
