//! Remote service manager: load, watch, reload and call remote services

use crate::backend::Backend;
use crate::dispatcher::Dispatcher;
use crate::metrics::CallMetrics;
use crate::reload::ReloadCoordinator;
use crate::telemetry::{NoticeSink, TaskNoticeSink, TelemetryAdapter};
use crate::watcher::{FileWatcher, ReloadCallback};
use service_api::{CallRequest, CallResult};
use service_core::{conf_file_path, ChannelSnapshot, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Collaborators of a `RemoteServiceManager`
#[derive(Clone)]
pub struct ManagerOptions {
    /// Triggers reloads when the configuration file changes
    pub watcher: Option<Arc<dyn FileWatcher>>,
    pub metrics: Option<CallMetrics>,
    /// Receives one notice per call
    pub notice_sink: Arc<dyn NoticeSink>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            watcher: None,
            metrics: None,
            notice_sink: Arc::new(TaskNoticeSink),
        }
    }
}

pub struct RemoteServiceManager {
    coordinator: Arc<ReloadCoordinator>,
    dispatcher: Dispatcher,
    watcher: Option<Arc<dyn FileWatcher>>,
    shut_down: AtomicBool,
}

impl RemoteServiceManager {
    /// Load `<dir>/<file>`, publish the first snapshot and start watching
    /// the file for changes.
    ///
    /// Fails if the first load fails; there is no snapshot to fall back to.
    pub fn init(dir: Option<&str>, file: Option<&str>, options: ManagerOptions) -> Result<Self> {
        let path = conf_file_path(dir, file);
        let coordinator = Arc::new(ReloadCoordinator::load_initial(&path, options.metrics.clone())?);

        if let Some(watcher) = &options.watcher {
            // The watcher must not keep the coordinator alive
            let weak = Arc::downgrade(&coordinator);
            let callback: ReloadCallback = Arc::new(move || match weak.upgrade() {
                Some(coordinator) => coordinator.reload().map(|_| ()),
                None => Ok(()),
            });
            watcher.register(coordinator.path(), callback)?;
            info!("Watching {} for changes", path);
        }

        let dispatcher = Dispatcher::new(
            coordinator.registry().clone(),
            TelemetryAdapter::new(options.notice_sink, options.metrics),
        );

        Ok(Self {
            coordinator,
            dispatcher,
            watcher: options.watcher,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn conf_path(&self) -> &Path {
        self.coordinator.path()
    }

    /// Reload the configuration file. The current snapshot is kept on failure.
    pub fn reload(&self) -> Result<()> {
        self.coordinator.reload().map(|_| ())
    }

    pub async fn call(&self, service_name: &str, request: &CallRequest) -> Result<CallResult> {
        self.dispatcher.call(service_name, request).await
    }

    /// Snapshot currently serving calls
    pub fn snapshot(&self) -> Arc<ChannelSnapshot<Backend>> {
        self.coordinator.registry().current()
    }

    /// Stop watching the configuration file. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(watcher) = &self.watcher {
            watcher.unregister(self.coordinator.path());
        }
        debug!("Remote service manager for {} shut down", self.coordinator.path().display());
    }
}

impl Drop for RemoteServiceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
