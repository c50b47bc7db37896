use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to read service configuration {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid service configuration: {0}")]
    ConfigParse(String),

    #[error("Failed to init channel for service {service}: {reason}")]
    BackendInit { service: String, reason: String },

    #[error("Failed to watch {path}: {reason}")]
    Watch { path: String, reason: String },

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Unsupported protocol {protocol} for service {service}")]
    UnsupportedProtocol { service: String, protocol: String },

    #[error("Call to service {service} failed: {reason}")]
    BackendCallFailed { service: String, reason: String },
}

