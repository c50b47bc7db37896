//! Core remote service registry functionality
//!
//! This library provides:
//! - Parsing and validation of the remote service configuration document
//! - Immutable channel snapshots and the lock-free registry that publishes them
//! - The error taxonomy shared by the loader and the dispatcher

pub mod config;
pub mod endpoint;
pub mod error;
pub mod registry;

pub use config::{conf_file_path, load_channel_specs, parse_channel_specs};
pub use endpoint::Endpoint;
pub use error::{CoreError, Result};
pub use registry::{ChannelRegistry, ChannelSnapshot, ServiceChannel};
