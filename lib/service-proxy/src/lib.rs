//! Remote service calls over HTTP
//!
//! This library provides:
//! - Pooled, load-balanced channels with internal retry
//! - A single-shot client opening one connection per call
//! - The dispatcher routing calls by service name through the current snapshot
//! - Hot reload of the service configuration on file change
//! - Per-request notice logging and Prometheus metrics

pub mod backend;
pub mod dispatcher;
pub mod headers;
pub mod load_balancer;
pub mod manager;
pub mod metrics;
pub mod naming;
pub mod policy;
pub mod pooled;
pub mod reload;
pub mod single_shot;
pub mod telemetry;
pub mod transport;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{build_backend, build_channels, Backend};
pub use dispatcher::Dispatcher;
pub use load_balancer::{LoadBalancer, LoadBalancingStrategy};
pub use manager::{ManagerOptions, RemoteServiceManager};
pub use metrics::{CallMetrics, UNKNOWN_SERVICE_LABEL};
pub use policy::{ChannelOptions, RetryPolicy, TimeoutPolicy};
pub use pooled::PooledChannel;
pub use reload::ReloadCoordinator;
pub use single_shot::SingleShotClient;
pub use telemetry::{
    extract_trace_id, generate_trace_id, CallRecord, NoticeLog, NoticeSink, TaskNoticeSink, TelemetryAdapter,
};
pub use transport::{HttpTransport, OutboundRequest, TransportError, TransportResponse};
pub use watcher::{FileWatcher, PollingFileWatcher, ReloadCallback};
