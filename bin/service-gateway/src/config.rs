//! Gateway settings read from the environment

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_CONF_DIR: &str = "./conf";
const DEFAULT_CONF_FILE: &str = "remote_service.json";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_POLL_MS: u64 = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    pub conf_dir: String,
    pub conf_file: String,
    pub listen_addr: SocketAddr,
    /// How often the configuration file is checked for changes
    pub poll_interval: Duration,
}

impl GatewayConfig {
    /// Load from `SERVICE_CONF_DIR`, `SERVICE_CONF_FILE`, `GATEWAY_LISTEN_ADDR`
    /// and `SERVICE_CONF_POLL_MS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let conf_dir = lookup("SERVICE_CONF_DIR").unwrap_or_else(|| DEFAULT_CONF_DIR.to_string());
        let conf_file = lookup("SERVICE_CONF_FILE").unwrap_or_else(|| DEFAULT_CONF_FILE.to_string());

        let listen_addr = lookup("GATEWAY_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr: SocketAddr = listen_addr
            .parse()
            .with_context(|| format!("invalid GATEWAY_LISTEN_ADDR {}", listen_addr))?;

        let poll_ms = match lookup("SERVICE_CONF_POLL_MS") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("invalid SERVICE_CONF_POLL_MS {}", value))?,
            None => DEFAULT_POLL_MS,
        };
        if poll_ms == 0 {
            anyhow::bail!("SERVICE_CONF_POLL_MS must be positive");
        }

        Ok(Self {
            conf_dir,
            conf_file,
            listen_addr,
            poll_interval: Duration::from_millis(poll_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.conf_dir, "./conf");
        assert_eq!(config.conf_file, "remote_service.json");
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("SERVICE_CONF_DIR", "/etc/services"),
            ("SERVICE_CONF_FILE", "remote.json"),
            ("GATEWAY_LISTEN_ADDR", "127.0.0.1:9090"),
            ("SERVICE_CONF_POLL_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.conf_dir, "/etc/services");
        assert_eq!(config.conf_file, "remote.json");
        assert_eq!(config.listen_addr.port(), 9090);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        assert!(GatewayConfig::from_lookup(lookup(&[("GATEWAY_LISTEN_ADDR", "localhost")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("SERVICE_CONF_POLL_MS", "soon")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("SERVICE_CONF_POLL_MS", "0")])).is_err());
    }
}
