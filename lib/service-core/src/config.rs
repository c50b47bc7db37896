//! Loader for the remote service configuration document
//!
//! The document is a JSON object keyed by service name. Loading is
//! all-or-nothing: any invalid entry fails the whole document.

use crate::{CoreError, Result};
use hyper::header::{HeaderName, HeaderValue};
use serde_json::{Map, Value};
use service_api::{ClientKind, Protocol, ServiceChannelSpec};
use std::path::Path;
use tracing::{debug, warn};

/// Join a configuration directory and file name.
pub fn conf_file_path(dir: Option<&str>, file: Option<&str>) -> String {
    let mut path = dir.unwrap_or_default().to_string();
    if !path.is_empty() && !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(file.unwrap_or_default());
    path
}

/// Read and parse the configuration file at `path`
pub fn load_channel_specs(path: impl AsRef<Path>) -> Result<Vec<ServiceChannelSpec>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| CoreError::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;
    parse_channel_specs(&bytes)
}

/// Parse a configuration document into validated specs, in document order
pub fn parse_channel_specs(bytes: &[u8]) -> Result<Vec<ServiceChannelSpec>> {
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|e| CoreError::ConfigParse(format!("malformed document: {}", e)))?;

    let services = doc
        .as_object()
        .ok_or_else(|| CoreError::ConfigParse("top-level document must be an object".to_string()))?;

    let mut specs = Vec::with_capacity(services.len());
    for (name, settings) in services {
        let settings = settings.as_object().ok_or_else(|| {
            CoreError::ConfigParse(format!(
                "Invalid service settings for {}, expecting type object for service setting",
                name
            ))
        })?;
        specs.push(parse_service(name, settings)?);
        debug!("Parsed service {}", name);
    }

    Ok(specs)
}

fn parse_service(name: &str, settings: &Map<String, Value>) -> Result<ServiceChannelSpec> {
    let naming_service_url = required_str(name, settings, "naming_service_url")?;
    let load_balancer_name = required_str(name, settings, "load_balancer_name")?;
    let protocol_name = required_str(name, settings, "protocol")?;

    let client = match settings.get("client") {
        None => "",
        Some(Value::String(client)) => client.as_str(),
        Some(other) => {
            warn!(
                "Ignoring non-string client {} for service {}, using the pooled client",
                other, name
            );
            ""
        }
    };

    let timeout_ms = required_u32(name, settings, "timeout_ms")?;
    let max_retry = required_u32(name, settings, "retry")?;
    let headers = parse_headers(name, settings)?;

    let protocol = Protocol::from_name(protocol_name).ok_or_else(|| {
        CoreError::ConfigParse(format!(
            "Unsupported protocol [{}] for service [{}]",
            protocol_name, name
        ))
    })?;

    let client_kind = ClientKind::from_name(client).ok_or_else(|| {
        CoreError::ConfigParse(format!(
            "Unsupported client value [{}] for service [{}]",
            client, name
        ))
    })?;

    Ok(ServiceChannelSpec {
        name: name.to_string(),
        protocol,
        client_kind,
        naming_service_url: naming_service_url.to_string(),
        load_balancer_name: load_balancer_name.to_string(),
        timeout_ms,
        max_retry,
        headers,
    })
}

fn required_str<'a>(service: &str, settings: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    settings
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            CoreError::ConfigParse(format!(
                "Invalid service settings for {}, expecting type String for property {}",
                service, key
            ))
        })
}

fn required_u32(service: &str, settings: &Map<String, Value>, key: &str) -> Result<u32> {
    settings
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            CoreError::ConfigParse(format!(
                "Invalid service settings for {}, expecting non-negative Int for property {}",
                service, key
            ))
        })
}

fn parse_headers(service: &str, settings: &Map<String, Value>) -> Result<Vec<(String, String)>> {
    let headers = match settings.get("headers") {
        None => return Ok(Vec::new()),
        Some(Value::Object(headers)) => headers,
        Some(_) => {
            warn!("Ignoring non-object headers for service {}", service);
            return Ok(Vec::new());
        }
    };

    let mut parsed: Vec<(String, String)> = Vec::with_capacity(headers.len());
    for (key, value) in headers {
        let value = value.as_str().ok_or_else(|| {
            CoreError::ConfigParse(format!(
                "Invalid header value for {} of service {}, expecting type String for header value",
                key, service
            ))
        })?;

        if HeaderName::from_bytes(key.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            return Err(CoreError::ConfigParse(format!(
                "Invalid header {} for service {}",
                key, service
            )));
        }

        if parsed.iter().any(|(seen, _)| seen.eq_ignore_ascii_case(key))
            && !key.eq_ignore_ascii_case("content-type")
        {
            return Err(CoreError::ConfigParse(format!(
                "Duplicate header {} for service {}",
                key, service
            )));
        }

        parsed.push((key.clone(), value.to_string()));
    }

    Ok(parsed)
}
