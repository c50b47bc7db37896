use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire protocol spoken to a remote service. Only HTTP is supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Protocol {
    Http,
}

impl Protocol {
    /// Parse the `protocol` property of a service entry
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "http" => Some(Protocol::Http),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client used to reach a remote service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// Load-balanced, connection-pooled channel created once per snapshot
    PooledRpc,
    /// One connection per call, no retry
    SimpleHttp,
}

impl Default for ClientKind {
    fn default() -> Self {
        ClientKind::PooledRpc
    }
}

impl ClientKind {
    /// Parse the `client` property. Empty and "brpc" select the pooled client.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "" | "brpc" => Some(ClientKind::PooledRpc),
            "curl" => Some(ClientKind::SimpleHttp),
            _ => None,
        }
    }
}

/// Validated settings of one remote service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceChannelSpec {
    /// Service name, unique within a snapshot
    pub name: String,

    pub protocol: Protocol,

    #[serde(default)]
    pub client_kind: ClientKind,

    /// How backend addresses are resolved (list://, http://, file://, host:port)
    pub naming_service_url: String,

    /// Balancing policy name understood by the pooled client
    pub load_balancer_name: String,

    pub timeout_ms: u32,

    /// Extra attempts on connection errors. Ignored by the single-shot client.
    pub max_retry: u32,

    /// Headers replayed on every call, in document order
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}
