//! Request-scoped notice log and the telemetry adapter feeding it
//!
//! Every dispatched call leaves one notice entry in the log of the request
//! that made it, keyed `service_<name>` with value
//! `remote:<remote>|tm:<latency ms>|ret:<0|-1>`.

use crate::metrics::{CallMetrics, UNKNOWN_SERVICE_LABEL};
use std::fmt::Write;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

tokio::task_local! {
    static NOTICE_LOG: NoticeLog;
}

/// Ordered `(key, value)` entries collected while serving one request
#[derive(Clone, Debug)]
pub struct NoticeLog {
    trace_id: String,
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::with_trace_id(generate_trace_id())
    }

    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn add(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key.into(), value.into()));
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Value of the most recent entry under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Entries as a single `key=value key=value` line
    pub fn render(&self) -> String {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut line = String::new();
        for (key, value) in entries.iter() {
            if !line.is_empty() {
                line.push(' ');
            }
            let _ = write!(line, "{}={}", key, value);
        }
        line
    }

    /// Run `fut` with this log installed as the current one
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        NOTICE_LOG.scope(self, fut).await
    }

    /// The log of the request being served, if any
    pub fn current() -> Option<NoticeLog> {
        NOTICE_LOG.try_with(|log| log.clone()).ok()
    }
}

impl Default for NoticeLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a new trace ID (random 32 hex digits)
pub fn generate_trace_id() -> String {
    let mut id = String::with_capacity(32);
    for _ in 0..16 {
        write!(&mut id, "{:02x}", rand::random::<u8>()).ok();
    }
    id
}

/// Trace id carried by a W3C `traceparent` header
/// (`version-trace_id-span_id-trace_flags`)
pub fn extract_trace_id(traceparent: &str) -> Option<String> {
    let parts: Vec<&str> = traceparent.trim().split('-').collect();
    if parts.len() >= 4 && !parts[1].is_empty() && parts[1].chars().all(|c| c.is_ascii_hexdigit()) {
        Some(parts[1].to_string())
    } else {
        None
    }
}

/// Receives notice entries for the current request
pub trait NoticeSink: Send + Sync {
    fn add_notice(&self, key: &str, value: &str);
}

/// Sink writing into the current task's `NoticeLog`
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskNoticeSink;

impl NoticeSink for TaskNoticeSink {
    fn add_notice(&self, key: &str, value: &str) {
        match NoticeLog::current() {
            Some(log) => log.add(key, value),
            None => debug!("No notice log in scope, dropping {}={}", key, value),
        }
    }
}

/// Outcome of one dispatched call as reported to telemetry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord<'a> {
    pub service: &'a str,
    /// False when the name is not in the snapshot the call used
    pub configured: bool,
    pub remote_side: &'a str,
    pub latency_ms: u64,
    pub success: bool,
}

pub fn notice_key(service: &str) -> String {
    format!("service_{}", service)
}

pub fn format_notice(remote_side: &str, latency_ms: u64, success: bool) -> String {
    format!(
        "remote:{}|tm:{}|ret:{}",
        remote_side,
        latency_ms,
        if success { 0 } else { -1 }
    )
}

/// Forwards call outcomes to the notice sink, the log and metrics
#[derive(Clone)]
pub struct TelemetryAdapter {
    sink: Arc<dyn NoticeSink>,
    metrics: Option<CallMetrics>,
}

impl TelemetryAdapter {
    pub fn new(sink: Arc<dyn NoticeSink>, metrics: Option<CallMetrics>) -> Self {
        Self { sink, metrics }
    }

    pub fn metrics(&self) -> Option<&CallMetrics> {
        self.metrics.as_ref()
    }

    pub fn record(&self, record: &CallRecord<'_>) {
        let value = format_notice(record.remote_side, record.latency_ms, record.success);
        debug!(
            service = %record.service,
            remote = %record.remote_side,
            latency_ms = record.latency_ms,
            success = record.success,
            "Remote service call finished"
        );
        self.sink.add_notice(&notice_key(record.service), &value);

        if let Some(metrics) = &self.metrics {
            // Caller-supplied names never become label values
            let label = if record.configured {
                record.service
            } else {
                UNKNOWN_SERVICE_LABEL
            };
            metrics.observe_call(
                label,
                record.success,
                Duration::from_millis(record.latency_ms),
            );
        }
    }
}

impl Default for TelemetryAdapter {
    fn default() -> Self {
        Self::new(Arc::new(TaskNoticeSink), None)
    }
}
