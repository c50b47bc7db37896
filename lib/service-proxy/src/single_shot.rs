//! Single-shot HTTP client: one connection per call, no retry
//!
//! The service's `retry` setting is not honored here; a failed call fails.

use crate::naming;
use crate::transport::{elapsed_ms, error_chain, HttpTransport, OutboundRequest, TransportError, TransportResponse};
use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::client::conn::http1;
use hyper::header::{HeaderValue, HOST};
use hyper::Uri;
use hyper_util::rt::TokioIo;
use service_api::ServiceChannelSpec;
use service_core::Endpoint;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout as tokio_timeout;
use tracing::debug;

const DEFAULT_HTTP_PORT: u16 = 80;

#[derive(Clone, Debug, Default)]
pub struct SingleShotClient;

impl SingleShotClient {
    pub fn new() -> Self {
        Self
    }

    /// Work out the server and request target for a call.
    ///
    /// Absolute `http://` urls are used as-is. Paths are resolved against an
    /// `http://` naming service url.
    pub fn resolve_target(url: &str, naming_service_url: &str) -> Result<(Endpoint, String), String> {
        if url.starts_with('/') {
            let base = naming::http_base(naming_service_url).ok_or_else(|| {
                format!(
                    "cannot resolve relative url {} against naming service {}",
                    url, naming_service_url
                )
            })?;
            return Ok((base, url.to_string()));
        }

        let uri: Uri = url.parse().map_err(|e| format!("invalid url {}: {}", url, e))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some("https") => return Err(format!("https is not supported by the single-shot client: {}", url)),
            _ => return Err(format!("url must be absolute http or a path: {}", url)),
        }

        let host = uri
            .host()
            .ok_or_else(|| format!("url has no host: {}", url))?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let endpoint = Endpoint::new(host, uri.port_u16().unwrap_or(DEFAULT_HTTP_PORT));
        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok((endpoint, target))
    }

    /// Perform one HTTP exchange over a fresh connection
    pub async fn perform(
        &self,
        url: &str,
        naming_service_url: &str,
        request: &OutboundRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let started = Instant::now();
        let (endpoint, target) =
            Self::resolve_target(url, naming_service_url).map_err(TransportError::new)?;

        let stream = match tokio_timeout(timeout, TcpStream::connect((endpoint.host.as_str(), endpoint.port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::new(format!("failed to connect to {}: {}", endpoint, e)));
            }
            Err(_) => {
                return Err(TransportError::new(format!(
                    "timed out connecting to {} after {}ms",
                    endpoint,
                    timeout.as_millis()
                )));
            }
        };
        let _ = stream.set_nodelay(true);

        let remote_ip = stream
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|_| endpoint.host.clone());

        let uri: Uri = target
            .parse()
            .map_err(|e| TransportError::new(format!("invalid request target {}: {}", target, e)).at(&remote_ip, started))?;
        let mut hyper_request = request.to_request(uri);
        if !hyper_request.headers().contains_key(HOST) {
            if let Ok(host) = HeaderValue::from_str(&endpoint.to_string()) {
                hyper_request.headers_mut().insert(HOST, host);
            }
        }

        let exchange = async {
            let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
                .await
                .map_err(|e| format!("handshake failed: {}", error_chain(&e)))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!("Single-shot connection closed with error: {}", e);
                }
            });

            let response = sender
                .send_request(hyper_request)
                .await
                .map_err(|e| error_chain(&e))?;
            let status = response.status().as_u16();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| format!("failed to read response body: {}", e))?
                .to_bytes();
            Ok::<_, String>((status, body))
        };

        let remaining = timeout.saturating_sub(started.elapsed());
        match tokio_timeout(remaining, exchange).await {
            Ok(Ok((status, body))) => Ok(TransportResponse {
                status,
                body,
                remote_side: remote_ip,
                latency_ms: elapsed_ms(started),
            }),
            Ok(Err(reason)) => Err(TransportError::new(reason).at(remote_ip, started)),
            Err(_) => Err(
                TransportError::new(format!("timed out after {}ms", timeout.as_millis())).at(remote_ip, started),
            ),
        }
    }
}

#[async_trait]
impl HttpTransport for SingleShotClient {
    fn name(&self) -> &'static str {
        "single-shot"
    }

    async fn invoke(
        &self,
        spec: &ServiceChannelSpec,
        request: &OutboundRequest,
    ) -> Result<TransportResponse, TransportError> {
        let timeout = Duration::from_millis(spec.timeout_ms as u64);
        self.perform(&request.url, &spec.naming_service_url, request, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spec, unused_port, StubServer};
    use hyper::body::Bytes;
    use service_api::{CallRequest, ClientKind};

    fn curl_spec(naming: &str, timeout_ms: u32, max_retry: u32) -> ServiceChannelSpec {
        ServiceChannelSpec {
            client_kind: ClientKind::SimpleHttp,
            timeout_ms,
            max_retry,
            ..spec("curl", naming)
        }
    }

    #[test]
    fn test_resolve_absolute_url() {
        let (endpoint, target) =
            SingleShotClient::resolve_target("http://127.0.0.1:9000/a/b?c=d", "").unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 9000));
        assert_eq!(target, "/a/b?c=d");

        let (endpoint, target) = SingleShotClient::resolve_target("http://example.com", "").unwrap();
        assert_eq!(endpoint, Endpoint::new("example.com", 80));
        assert_eq!(target, "/");
    }

    #[test]
    fn test_resolve_relative_url() {
        let (endpoint, target) =
            SingleShotClient::resolve_target("/ping", "http://127.0.0.1:8000").unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 8000));
        assert_eq!(target, "/ping");

        assert!(SingleShotClient::resolve_target("/ping", "list://127.0.0.1:8000").is_err());
    }

    #[test]
    fn test_resolve_rejects_https_and_garbage() {
        assert!(SingleShotClient::resolve_target("https://example.com/", "")
            .unwrap_err()
            .contains("https"));
        assert!(SingleShotClient::resolve_target("ftp://example.com/", "").is_err());
        assert!(SingleShotClient::resolve_target("not a url", "").is_err());
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let server = StubServer::start("pong").await;
        let spec = curl_spec("", 1000, 0);
        let request = OutboundRequest::prepare(
            &spec,
            &CallRequest::post(format!("http://{}/echo", server.addr()), "hello"),
        )
        .unwrap();

        let response = SingleShotClient::new().invoke(&spec, &request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Bytes::from("pong"));
        assert_eq!(response.remote_side, "127.0.0.1");

        let recorded = server.requests();
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].uri, "/echo");
        assert_eq!(recorded[0].body, "hello");
        assert_eq!(recorded[0].header("host"), Some(server.addr().to_string()));
    }

    #[tokio::test]
    async fn test_each_call_opens_a_connection() {
        let server = StubServer::start("pong").await;
        let spec = curl_spec(&format!("http://{}", server.addr()), 1000, 0);
        let request = OutboundRequest::prepare(&spec, &CallRequest::get("/ping")).unwrap();

        let client = SingleShotClient::new();
        client.invoke(&spec, &request).await.unwrap();
        client.invoke(&spec, &request).await.unwrap();
        assert_eq!(server.connections(), 2);
    }

    #[tokio::test]
    async fn test_any_status_is_returned() {
        let server = StubServer::builder().status(404).body("missing").start().await;
        let spec = curl_spec(&format!("http://{}", server.addr()), 1000, 0);
        let request = OutboundRequest::prepare(&spec, &CallRequest::get("/nothing")).unwrap();

        let response = SingleShotClient::new().invoke(&spec, &request).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, Bytes::from("missing"));
    }

    #[tokio::test]
    async fn test_retry_setting_is_ignored() {
        let port = unused_port();
        let spec = curl_spec(&format!("http://127.0.0.1:{}", port), 1000, 5);
        let request = OutboundRequest::prepare(&spec, &CallRequest::get("/ping")).unwrap();

        let error = SingleShotClient::new().invoke(&spec, &request).await.unwrap_err();
        assert!(error.reason.contains("connect"));
        // Nothing was known about the peer before the connection failed
        assert!(error.remote_side.is_none());
        assert!(error.latency_ms.is_none());
    }

    #[tokio::test]
    async fn test_hard_timeout() {
        let server = StubServer::builder()
            .body("slow")
            .delay(Duration::from_millis(500))
            .start()
            .await;
        let spec = curl_spec(&format!("http://{}", server.addr()), 50, 3);
        let request = OutboundRequest::prepare(&spec, &CallRequest::get("/slow")).unwrap();

        let error = SingleShotClient::new().invoke(&spec, &request).await.unwrap_err();
        assert!(error.reason.contains("timed out"));
        assert_eq!(error.remote_side.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.requests().len(), 1);
    }
}
