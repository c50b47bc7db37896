//! Builds the backend handle each configured service is called through

use crate::policy::ChannelOptions;
use crate::pooled::PooledChannel;
use service_api::{ClientKind, ServiceChannelSpec};
use service_core::{Result, ServiceChannel};
use tracing::debug;

/// Backend handle stored in a channel snapshot
#[derive(Debug)]
pub enum Backend {
    /// Long-lived pooled channel owned by the snapshot
    Pooled(PooledChannel),
    /// No handle; every call opens its own connection
    SingleShot,
}

impl Backend {
    pub fn pooled(&self) -> Option<&PooledChannel> {
        match self {
            Backend::Pooled(channel) => Some(channel),
            Backend::SingleShot => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Pooled(_) => "pooled",
            Backend::SingleShot => "single-shot",
        }
    }
}

pub fn build_backend(spec: &ServiceChannelSpec) -> Result<Backend> {
    match spec.client_kind {
        ClientKind::PooledRpc => {
            let channel = PooledChannel::init(
                &spec.name,
                &spec.naming_service_url,
                &spec.load_balancer_name,
                ChannelOptions::from_spec(spec),
            )?;
            Ok(Backend::Pooled(channel))
        }
        ClientKind::SimpleHttp => Ok(Backend::SingleShot),
    }
}

/// Build a backend for every spec, failing on the first one that cannot be built
pub fn build_channels(specs: Vec<ServiceChannelSpec>) -> Result<Vec<ServiceChannel<Backend>>> {
    specs
        .into_iter()
        .map(|spec| {
            let backend = build_backend(&spec)?;
            debug!("Service {} uses a {} backend", spec.name, backend.kind());
            Ok(ServiceChannel::new(spec, backend))
        })
        .collect()
}
