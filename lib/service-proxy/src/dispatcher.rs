//! Routes calls to the backend of the named service

use crate::backend::Backend;
use crate::single_shot::SingleShotClient;
use crate::telemetry::{CallRecord, TelemetryAdapter};
use crate::transport::{HttpTransport, OutboundRequest};
use service_api::{CallRequest, CallResult, Protocol};
use service_core::{ChannelRegistry, ChannelSnapshot, CoreError, Result};
use std::sync::Arc;
use tracing::warn;

/// A failed call together with what is known about where it went
struct DispatchFailure {
    error: CoreError,
    remote_side: Option<String>,
    latency_ms: Option<u64>,
}

impl From<CoreError> for DispatchFailure {
    fn from(error: CoreError) -> Self {
        Self {
            error,
            remote_side: None,
            latency_ms: None,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<ChannelRegistry<Backend>>,
    single_shot: SingleShotClient,
    telemetry: TelemetryAdapter,
}

impl Dispatcher {
    pub fn new(registry: Arc<ChannelRegistry<Backend>>, telemetry: TelemetryAdapter) -> Self {
        Self {
            registry,
            single_shot: SingleShotClient::new(),
            telemetry,
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry<Backend>> {
        &self.registry
    }

    /// Call `service_name` with `request`.
    ///
    /// The call is served entirely by the snapshot current when it starts,
    /// even if a reload publishes a new one meanwhile. Every call is reported
    /// to telemetry, whether it succeeds or not.
    pub async fn call(&self, service_name: &str, request: &CallRequest) -> Result<CallResult> {
        let snapshot = self.registry.current();

        match self.dispatch(&snapshot, service_name, request).await {
            Ok(result) => {
                self.telemetry.record(&CallRecord {
                    service: service_name,
                    configured: true,
                    remote_side: &result.remote_side,
                    latency_ms: result.latency_ms,
                    success: true,
                });
                Ok(result)
            }
            Err(failure) => {
                self.telemetry.record(&CallRecord {
                    service: service_name,
                    configured: !matches!(failure.error, CoreError::ServiceNotFound(_)),
                    remote_side: failure.remote_side.as_deref().unwrap_or_default(),
                    latency_ms: failure.latency_ms.unwrap_or_default(),
                    success: false,
                });
                warn!("{}", failure.error);
                Err(failure.error)
            }
        }
    }

    async fn dispatch(
        &self,
        snapshot: &ChannelSnapshot<Backend>,
        service_name: &str,
        request: &CallRequest,
    ) -> std::result::Result<CallResult, DispatchFailure> {
        let channel = snapshot
            .get(service_name)
            .ok_or_else(|| CoreError::ServiceNotFound(service_name.to_string()))?;

        match channel.spec.protocol {
            Protocol::Http => {}
            ref other => {
                return Err(CoreError::UnsupportedProtocol {
                    service: service_name.to_string(),
                    protocol: other.to_string(),
                }
                .into());
            }
        }

        let call_failed = |reason: String| CoreError::BackendCallFailed {
            service: service_name.to_string(),
            reason,
        };

        let outbound = OutboundRequest::prepare(&channel.spec, request).map_err(call_failed)?;

        let transport: &dyn HttpTransport = match &channel.backend {
            Backend::Pooled(pooled) => pooled,
            Backend::SingleShot => &self.single_shot,
        };

        let response = transport
            .invoke(&channel.spec, &outbound)
            .await
            .map_err(|e| DispatchFailure {
                error: call_failed(format!("{} ({})", e.reason, transport.name())),
                remote_side: e.remote_side,
                latency_ms: e.latency_ms,
            })?;

        Ok(CallResult {
            body: String::from_utf8_lossy(&response.body).into_owned(),
            status: response.status,
            remote_side: response.remote_side,
            latency_ms: response.latency_ms,
        })
    }
}
