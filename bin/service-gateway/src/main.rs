use anyhow::Result;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use service_api::CallRequest;
use service_proxy::{
    extract_trace_id, generate_trace_id, CallMetrics, FileWatcher, ManagerOptions, NoticeLog,
    PollingFileWatcher, RemoteServiceManager,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod router;

use config::GatewayConfig;
use router::{status_for, Route};

/// Shared state of the gateway
struct Gateway {
    manager: RemoteServiceManager,
    metrics: CallMetrics,
}

impl Gateway {
    fn new(config: &GatewayConfig) -> Result<Self> {
        let metrics = CallMetrics::new()?;
        info!("Metrics collector initialized");

        let watcher: Arc<dyn FileWatcher> = Arc::new(PollingFileWatcher::new(config.poll_interval));
        let manager = RemoteServiceManager::init(
            Some(&config.conf_dir),
            Some(&config.conf_file),
            ManagerOptions {
                watcher: Some(watcher),
                metrics: Some(metrics.clone()),
                ..ManagerOptions::default()
            },
        )?;
        info!(
            "Remote service manager initialized from {} with {} services",
            manager.conf_path().display(),
            manager.snapshot().len()
        );

        Ok(Self { manager, metrics })
    }

    async fn respond(&self, method: &Method, path: &str, query: Option<&str>, body: Bytes) -> Response<Full<Bytes>> {
        let route = match Route::resolve(method, path, query) {
            Ok(route) => route,
            Err(status) => return text_response(status, status.canonical_reason().unwrap_or_default()),
        };

        match route {
            Route::Health => text_response(StatusCode::OK, "OK"),
            Route::Metrics => match self.metrics.gather() {
                Ok(text) => {
                    let mut response = Response::new(Full::new(Bytes::from(text)));
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
                    response
                }
                Err(e) => {
                    warn!("Failed to gather metrics: {}", e);
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics")
                }
            },
            Route::Services => {
                let snapshot = self.manager.snapshot();
                let document = serde_json::json!({
                    "generation": snapshot.generation(),
                    "services": snapshot.specs().collect::<Vec<_>>(),
                });
                json_response(StatusCode::OK, document.to_string())
            }
            Route::Call { service, url } => {
                let request = if *method == Method::POST {
                    CallRequest::post(url, String::from_utf8_lossy(&body))
                } else {
                    CallRequest::get(url)
                };

                match self.manager.call(&service, &request).await {
                    Ok(result) => {
                        let status = StatusCode::from_u16(result.status).unwrap_or(StatusCode::OK);
                        text_response(status, result.body)
                    }
                    Err(e) => text_response(status_for(&e), e.to_string()),
                }
            }
        }
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = text_response(status, body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting service-gateway...");

    let config = GatewayConfig::from_env()?;
    info!(
        "Configuration: conf {}/{}, listen {}, poll every {:?}",
        config.conf_dir, config.conf_file, config.listen_addr, config.poll_interval
    );

    let gateway = Arc::new(Gateway::new(&config)?);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("HTTP server listening on {}", config.listen_addr);

    loop {
        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down service-gateway");
                break;
            }
        };
        let io = TokioIo::new(stream);
        let gateway = gateway.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, gateway.clone()));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
            }
        });
    }

    gateway.manager.shutdown();
    Ok(())
}

/// Serve one request inside its own notice log
async fn handle_request(
    req: Request<Incoming>,
    gateway: Arc<Gateway>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let started = Instant::now();
    let trace_id = req
        .headers()
        .get("traceparent")
        .and_then(|value| value.to_str().ok())
        .and_then(extract_trace_id)
        .unwrap_or_else(generate_trace_id);
    let log = NoticeLog::with_trace_id(trace_id);

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    debug!("{} {}", method, path);

    let body = req.into_body().collect().await?.to_bytes();
    let response = log
        .clone()
        .scope(async { gateway.respond(&method, &path, query.as_deref(), body).await })
        .await;

    info!(
        trace_id = %log.trace_id(),
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        notices = %log.render(),
        "Request completed"
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct TempDir(std::path::PathBuf);

    impl TempDir {
        fn with_conf(name: &str, contents: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("service-gateway-test-{}-{}", std::process::id(), name));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("remote_service.json"), contents).unwrap();
            Self(dir)
        }

        fn config(&self) -> GatewayConfig {
            GatewayConfig {
                conf_dir: self.0.to_str().unwrap().to_string(),
                conf_file: "remote_service.json".to_string(),
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                poll_interval: Duration::from_secs(60),
            }
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_health_and_services() {
        let dir = TempDir::with_conf(
            "services",
            r#"{"echo": {"naming_service_url": "list://127.0.0.1:8000", "load_balancer_name": "rr", "protocol": "http", "timeout_ms": 100, "retry": 0, "headers": {"X-A": "1"}}}"#,
        );
        let gateway = Gateway::new(&dir.config()).unwrap();

        let response = gateway.respond(&Method::GET, "/healthz", None, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = gateway.respond(&Method::GET, "/services", None, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let document: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(document["generation"], 1);
        assert_eq!(document["services"][0]["name"], "echo");
        assert_eq!(document["services"][0]["timeout_ms"], 100);
    }

    #[tokio::test]
    async fn test_call_errors_map_to_status() {
        let dir = TempDir::with_conf("errors", "{}");
        let gateway = Gateway::new(&dir.config()).unwrap();

        let log = NoticeLog::new();
        let response = log
            .clone()
            .scope(gateway.respond(&Method::GET, "/call/missing/ping", None, Bytes::new()))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(log.get("service_missing").as_deref(), Some("remote:|tm:0|ret:-1"));

        let response = gateway
            .respond(&Method::DELETE, "/call/missing/ping", None, Bytes::new())
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let dir = TempDir::with_conf("metrics", "{}");
        let gateway = Gateway::new(&dir.config()).unwrap();
        let _ = gateway.respond(&Method::GET, "/call/missing/", None, Bytes::new()).await;

        let response = gateway.respond(&Method::GET, "/metrics", None, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert!(text.contains("remote_service_calls_total"));
        assert!(text.contains("remote_service_snapshot_generation 1"));
    }

    #[test]
    fn test_startup_fails_on_missing_configuration() {
        let config = GatewayConfig {
            conf_dir: "/nonexistent-service-gateway-dir".to_string(),
            conf_file: "remote_service.json".to_string(),
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            poll_interval: Duration::from_secs(60),
        };
        assert!(Gateway::new(&config).is_err());
    }
}
