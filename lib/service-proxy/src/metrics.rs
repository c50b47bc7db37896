//! Prometheus metrics for remote service calls and reloads

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Service label for calls to names that are not configured
pub const UNKNOWN_SERVICE_LABEL: &str = "unknown";

/// Prometheus metrics collector for the remote service manager
#[derive(Clone)]
pub struct CallMetrics {
    /// Calls by service and outcome (`success` / `failure`)
    pub calls_total: CounterVec,
    /// Call latency in seconds by service
    pub call_duration_seconds: HistogramVec,
    /// Configuration reloads by result (`success` / `failure`)
    pub reloads_total: CounterVec,
    /// Generation of the published snapshot
    pub snapshot_generation: IntGauge,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl CallMetrics {
    /// Create a collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create a collector registering into `registry`
    pub fn with_registry(registry: Arc<Registry>) -> prometheus::Result<Self> {
        let calls_total = CounterVec::new(
            Opts::new("remote_service_calls_total", "Total remote service calls"),
            &["service", "outcome"],
        )?;

        let call_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "remote_service_call_duration_seconds",
                "Remote service call latency in seconds",
            ),
            &["service"],
        )?;

        let reloads_total = CounterVec::new(
            Opts::new("remote_service_reloads_total", "Total configuration reloads"),
            &["result"],
        )?;

        let snapshot_generation = IntGauge::new(
            "remote_service_snapshot_generation",
            "Generation of the active channel snapshot",
        )?;

        registry.register(Box::new(calls_total.clone()))?;
        registry.register(Box::new(call_duration_seconds.clone()))?;
        registry.register(Box::new(reloads_total.clone()))?;
        registry.register(Box::new(snapshot_generation.clone()))?;

        Ok(Self {
            calls_total,
            call_duration_seconds,
            reloads_total,
            snapshot_generation,
            registry,
        })
    }

    pub fn observe_call(&self, service: &str, success: bool, latency: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.calls_total.with_label_values(&[service, outcome]).inc();
        self.call_duration_seconds
            .with_label_values(&[service])
            .observe(latency.as_secs_f64());
    }

    /// Record a published snapshot
    pub fn observe_publish(&self, generation: u64) {
        self.snapshot_generation.set(generation as i64);
    }

    /// Record a reload attempt; a successful one also publishes `generation`
    pub fn observe_reload(&self, generation: Option<u64>) {
        match generation {
            Some(generation) => {
                self.reloads_total.with_label_values(&["success"]).inc();
                self.observe_publish(generation);
            }
            None => self.reloads_total.with_label_values(&["failure"]).inc(),
        }
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
