//! File watching for configuration reloads

use service_core::{CoreError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Invoked when a watched file changes
pub type ReloadCallback = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Notifies registered callbacks when a file changes.
///
/// Implementations must not run two callbacks for the same path at once.
pub trait FileWatcher: Send + Sync {
    fn register(&self, path: &Path, callback: ReloadCallback) -> Result<()>;

    fn unregister(&self, path: &Path);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

impl From<std::fs::Metadata> for Fingerprint {
    fn from(metadata: std::fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        }
    }
}

async fn fingerprint(path: &Path) -> Option<Fingerprint> {
    tokio::fs::metadata(path).await.ok().map(Fingerprint::from)
}

/// Watcher polling each file's modification time and size
pub struct PollingFileWatcher {
    interval: Duration,
    tasks: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
}

impl PollingFileWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
    }

    async fn poll(path: PathBuf, interval: Duration, mut last: Option<Fingerprint>, callback: ReloadCallback) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let current = fingerprint(&path).await;
            if current == last {
                continue;
            }
            last = current;

            if current.is_none() {
                warn!("Watched file {} disappeared", path.display());
                continue;
            }

            info!("Detected change in {}", path.display());
            let callback = callback.clone();
            match tokio::task::spawn_blocking(move || callback()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Reload after change in {} failed: {}", path.display(), e),
                Err(e) => error!("Reload task for {} panicked: {}", path.display(), e),
            }
        }
    }
}

impl Default for PollingFileWatcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FileWatcher for PollingFileWatcher {
    fn register(&self, path: &Path, callback: ReloadCallback) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| CoreError::Watch {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Baseline is the file as the caller last read it, before the task first runs
        let baseline = std::fs::metadata(path).ok().map(Fingerprint::from);
        let task = runtime.spawn(Self::poll(path.to_path_buf(), self.interval, baseline, callback));
        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), task);
        if let Some(previous) = previous {
            previous.abort();
        }

        debug!("Watching {} every {:?}", path.display(), self.interval);
        Ok(())
    }

    fn unregister(&self, path: &Path) {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
        if let Some(task) = task {
            task.abort();
            debug!("Stopped watching {}", path.display());
        }
    }
}

impl Drop for PollingFileWatcher {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}
