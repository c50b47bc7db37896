use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method of an outbound call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request dispatched to a named remote service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Path (or absolute URL) of the remote resource
    pub url: String,
    pub method: HttpMethod,
    /// Per-call headers, sent after the service's configured headers
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Request body. Only sent for POST.
    #[serde(default)]
    pub payload: String,
}

impl CallRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Add a per-call header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Outcome of a successful call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Response body
    pub body: String,
    /// HTTP status returned by the backend
    pub status: u16,
    /// Address of the server that answered
    pub remote_side: String,
    pub latency_ms: u64,
}
