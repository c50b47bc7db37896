//! Naming service resolution for pooled channels
//!
//! Supported forms:
//! - `list://host:port,host:port`
//! - `http://host[:port]` (single server, default port 80)
//! - `file:///path/to/servers` (one `host:port` per line, `#` comments)
//! - `host:port`

use service_core::Endpoint;
use tracing::debug;

const DEFAULT_HTTP_PORT: u16 = 80;

/// Resolve a naming service url into the list of backend servers
pub fn resolve(naming_service_url: &str) -> Result<Vec<Endpoint>, String> {
    let url = naming_service_url.trim();

    let endpoints = if let Some(list) = url.strip_prefix("list://") {
        parse_list(list.split(','))?
    } else if url.starts_with("http://") {
        vec![http_base(url).ok_or_else(|| format!("invalid http naming service url {}", url))?]
    } else if let Some(path) = url.strip_prefix("file://") {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read server list {}: {}", path, e))?;
        // Each line may carry a tag after the address
        parse_list(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#'))
                .map(|line| line.split_whitespace().next().unwrap_or_default()),
        )?
    } else if let Some((scheme, _)) = url.split_once("://") {
        return Err(format!("unsupported naming service scheme {}", scheme));
    } else {
        vec![Endpoint::parse(url, None).ok_or_else(|| format!("invalid server address {}", url))?]
    };

    debug!("Resolved {} to {} servers", url, endpoints.len());
    Ok(endpoints)
}

/// Base server of an `http://host[:port][/...]` naming service url
pub fn http_base(naming_service_url: &str) -> Option<Endpoint> {
    let rest = naming_service_url.trim().strip_prefix("http://")?;
    let authority = rest.split('/').next().unwrap_or_default();
    Endpoint::parse(authority, Some(DEFAULT_HTTP_PORT))
}

fn parse_list<'a>(addrs: impl Iterator<Item = &'a str>) -> Result<Vec<Endpoint>, String> {
    let mut endpoints = Vec::new();
    for addr in addrs.map(str::trim).filter(|addr| !addr.is_empty()) {
        let endpoint =
            Endpoint::parse(addr, None).ok_or_else(|| format!("invalid server address {}", addr))?;
        endpoints.push(endpoint);
    }

    if endpoints.is_empty() {
        return Err("naming service resolved to no servers".to_string());
    }
    Ok(endpoints)
}
