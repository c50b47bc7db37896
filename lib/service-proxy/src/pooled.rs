//! Load-balanced, connection-pooled channel to a remote service
//!
//! Built once per snapshot and shared by every call that holds the snapshot.
//! Applies the service's timeout to the whole call and retries connection
//! failures on another server, up to the configured retry count.

use crate::load_balancer::{LoadBalancer, LoadBalancingStrategy};
use crate::naming;
use crate::policy::ChannelOptions;
use crate::transport::{elapsed_ms, error_chain, HttpTransport, OutboundRequest, TransportError, TransportResponse};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use service_api::ServiceChannelSpec;
use service_core::{CoreError, Endpoint, Result};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, info, warn};

pub struct PooledChannel {
    service: String,
    endpoints: Vec<Endpoint>,
    balancer: LoadBalancer,
    options: ChannelOptions,
    client: Client<HttpConnector, Full<Bytes>>,
}

/// Failure of a single attempt
struct AttemptError {
    connect: bool,
    message: String,
}

impl PooledChannel {
    /// Resolve the naming service and set up the connection pool
    pub fn init(
        service: &str,
        naming_service_url: &str,
        load_balancer_name: &str,
        options: ChannelOptions,
    ) -> Result<Self> {
        let init_error = |reason: String| CoreError::BackendInit {
            service: service.to_string(),
            reason,
        };

        let endpoints = naming::resolve(naming_service_url).map_err(init_error)?;

        let strategy = if load_balancer_name.is_empty() {
            if endpoints.len() > 1 {
                return Err(init_error(format!(
                    "load_balancer_name is required when {} resolves to {} servers",
                    naming_service_url,
                    endpoints.len()
                )));
            }
            LoadBalancingStrategy::default()
        } else {
            LoadBalancingStrategy::from_name(load_balancer_name).ok_or_else(|| {
                init_error(format!("unknown load balancer {}", load_balancer_name))
            })?
        };

        // Configure HTTP connector with connection pooling
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(options.timeout.connect_timeout));
        connector.set_keepalive(Some(Duration::from_secs(30)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(connector);

        info!(
            "Initialized channel for service {} with {} servers ({:?}, timeout {:?}, max retry {})",
            service,
            endpoints.len(),
            strategy,
            options.timeout.request_timeout,
            options.retry.max_retries
        );

        Ok(Self {
            service: service.to_string(),
            balancer: LoadBalancer::new(strategy, endpoints.len()),
            endpoints,
            options,
            client,
        })
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.balancer.strategy()
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> std::result::Result<(StatusCode, Bytes), AttemptError> {
        let response = self.client.request(request).await.map_err(|e| AttemptError {
            connect: e.is_connect(),
            message: error_chain(&e),
        })?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| AttemptError {
                connect: false,
                message: format!("failed to read response body: {}", e),
            })?
            .to_bytes();

        Ok((status, body))
    }
}

#[async_trait]
impl HttpTransport for PooledChannel {
    fn name(&self) -> &'static str {
        "pooled"
    }

    async fn invoke(
        &self,
        _spec: &ServiceChannelSpec,
        request: &OutboundRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let started = Instant::now();
        let deadline = started + self.options.timeout.request_timeout;
        let path = request.path_and_query();

        let mut tried = Vec::new();
        let mut attempt = 0;
        loop {
            let index = self
                .balancer
                .select(&self.endpoints, &path, &tried)
                .ok_or_else(|| TransportError::new("no server available"))?;
            let remote = self.endpoints[index].to_string();

            let uri: Uri = format!("http://{}{}", remote, path).parse().map_err(|e| {
                TransportError::new(format!("invalid request uri: {}", e)).at(&remote, started)
            })?;

            debug!("Sending {} {} to {} (attempt {})", request.method, path, remote, attempt + 1);

            let _active = self.balancer.begin(index);
            let remaining = deadline.saturating_duration_since(Instant::now());
            let failure = match tokio_timeout(remaining, self.exchange(request.to_request(uri))).await {
                Ok(Ok((status, body))) => {
                    if !status.is_success() {
                        return Err(TransportError::new(format!(
                            "{} returned HTTP status {}",
                            remote,
                            status.as_u16()
                        ))
                        .at(remote, started));
                    }
                    return Ok(TransportResponse {
                        status: status.as_u16(),
                        body,
                        remote_side: remote,
                        latency_ms: elapsed_ms(started),
                    });
                }
                Ok(Err(failure)) => failure,
                Err(_) => {
                    return Err(TransportError::new(format!(
                        "timed out after {}ms",
                        self.options.timeout.request_timeout.as_millis()
                    ))
                    .at(remote, started));
                }
            };

            if failure.connect && self.options.retry.should_retry(attempt) {
                warn!(
                    "Connection to {} failed for service {} (attempt {}): {}, retrying",
                    remote,
                    self.service,
                    attempt + 1,
                    failure.message
                );
                tried.push(index);
                attempt += 1;
                continue;
            }

            return Err(TransportError::new(failure.message).at(remote, started));
        }
    }
}

impl fmt::Debug for PooledChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledChannel")
            .field("service", &self.service)
            .field("endpoints", &self.endpoints)
            .field("strategy", &self.balancer.strategy())
            .field("options", &self.options)
            .finish()
    }
}

impl Drop for PooledChannel {
    fn drop(&mut self) {
        debug!("Destroyed channel for service {}", self.service);
    }
}
