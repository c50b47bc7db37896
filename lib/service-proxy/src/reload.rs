//! Loads the configuration file into the channel registry

use crate::backend::{build_channels, Backend};
use crate::metrics::CallMetrics;
use service_core::{load_channel_specs, ChannelRegistry, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Sole writer of the channel registry
pub struct ReloadCoordinator {
    path: PathBuf,
    registry: Arc<ChannelRegistry<Backend>>,
    metrics: Option<CallMetrics>,
}

impl ReloadCoordinator {
    /// Load `path` and publish the first snapshot. Any failure is returned.
    pub fn load_initial(path: impl Into<PathBuf>, metrics: Option<CallMetrics>) -> Result<Self> {
        let path = path.into();
        let channels = build_channels(load_channel_specs(&path)?)?;
        let registry = Arc::new(ChannelRegistry::new(channels));

        info!("Loaded remote service configuration from {}", path.display());
        if let Some(metrics) = &metrics {
            metrics.observe_publish(registry.generation());
        }

        Ok(Self {
            path,
            registry,
            metrics,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry<Backend>> {
        &self.registry
    }

    /// Re-read the configuration file and publish a new snapshot.
    ///
    /// On failure the current snapshot keeps serving and the error is
    /// returned. Returns the generation of the published snapshot.
    pub fn reload(&self) -> Result<u64> {
        let result = self
            .registry
            .rebuild(|| build_channels(load_channel_specs(&self.path)?));

        match result {
            Ok(snapshot) => {
                info!(
                    "Reloaded remote service configuration from {} ({} services)",
                    self.path.display(),
                    snapshot.len()
                );
                if let Some(metrics) = &self.metrics {
                    metrics.observe_reload(Some(snapshot.generation()));
                }
                Ok(snapshot.generation())
            }
            Err(e) => {
                error!(
                    "Failed to reload {}, keeping snapshot {}: {}",
                    self.path.display(),
                    self.registry.generation(),
                    e
                );
                if let Some(metrics) = &self.metrics {
                    metrics.observe_reload(None);
                }
                Err(e)
            }
        }
    }
}
