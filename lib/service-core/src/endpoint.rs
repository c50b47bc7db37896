//! Backend endpoint addresses
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` or `[v6addr]:port`. When `default_port` is set the
    /// port may be omitted.
    pub fn parse(addr: &str, default_port: Option<u16>) -> Option<Self> {
        let addr = addr.trim();
        if addr.is_empty() {
            return None;
        }

        if let Some(rest) = addr.strip_prefix('[') {
            let close = rest.find(']')?;
            let host = &rest[..close];
            let port = match &rest[close + 1..] {
                "" => default_port?,
                tail => tail.strip_prefix(':')?.parse().ok()?,
            };
            return Some(Self::new(host, port));
        }

        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                Some(Self::new(host, port.parse().ok()?))
            }
            Some(_) => None,
            None => Some(Self::new(addr, default_port?)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let endpoint = Endpoint::parse("127.0.0.1:8000", None).unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 8000));
        assert_eq!(endpoint.to_string(), "127.0.0.1:8000");
    }

    #[test]
    fn test_parse_default_port() {
        assert_eq!(
            Endpoint::parse("example.com", Some(80)),
            Some(Endpoint::new("example.com", 80))
        );
        assert_eq!(Endpoint::parse("example.com", None), None);
    }

    #[test]
    fn test_parse_ipv6() {
        let endpoint = Endpoint::parse("[::1]:9000", None).unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.to_string(), "[::1]:9000");
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(Endpoint::parse("", Some(80)), None);
        assert_eq!(Endpoint::parse("host:notaport", None), None);
        assert_eq!(Endpoint::parse(":8080", None), None);
        assert_eq!(Endpoint::parse("host:99999", None), None);
    }
}
