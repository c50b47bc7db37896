//! Stub HTTP servers and fixtures shared by the crate's tests

use crate::watcher::{FileWatcher, ReloadCallback};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use service_api::{ClientKind, Protocol, ServiceChannelSpec};
use service_core::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request as seen by a stub server
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

#[derive(Clone, Debug)]
pub struct StubServerBuilder {
    status: u16,
    body: String,
    delay: Duration,
}

impl StubServerBuilder {
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn start(self) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let task = {
            let requests = requests.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    connections.fetch_add(1, Ordering::SeqCst);

                    let requests = requests.clone();
                    let config = self.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            let requests = requests.clone();
                            let config = config.clone();
                            async move {
                                let method = req.method().to_string();
                                let uri = req.uri().to_string();
                                let headers = req
                                    .headers()
                                    .iter()
                                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                                    .collect();
                                let body = req.into_body().collect().await?.to_bytes();
                                requests.lock().unwrap().push(RecordedRequest {
                                    method,
                                    uri,
                                    headers,
                                    body: String::from_utf8_lossy(&body).into_owned(),
                                });

                                if !config.delay.is_zero() {
                                    tokio::time::sleep(config.delay).await;
                                }

                                let mut response = Response::new(Full::new(Bytes::from(config.body)));
                                *response.status_mut() = StatusCode::from_u16(config.status).unwrap();
                                Ok::<_, hyper::Error>(response)
                            }
                        });
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
            })
        };

        StubServer {
            addr,
            requests,
            connections,
            task,
        }
    }
}

/// An HTTP server on a loopback port answering every request the same way
pub struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub fn builder() -> StubServerBuilder {
        StubServerBuilder {
            status: 200,
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub async fn start(body: &str) -> Self {
        Self::builder().body(body).start().await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn naming_url(&self) -> String {
        format!("list://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn spec(name: &str, naming_service_url: &str) -> ServiceChannelSpec {
    ServiceChannelSpec {
        name: name.to_string(),
        protocol: Protocol::Http,
        client_kind: ClientKind::PooledRpc,
        naming_service_url: naming_service_url.to_string(),
        load_balancer_name: "rr".to_string(),
        timeout_ms: 100,
        max_retry: 0,
        headers: Vec::new(),
    }
}

/// A loopback port with nothing listening on it
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Configuration file in a fresh temporary directory, removed on drop
pub struct TempConf {
    dir: PathBuf,
    file: String,
}

impl TempConf {
    pub fn new(contents: &str) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "service-proxy-test-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let conf = Self {
            dir,
            file: "remote_service.json".to_string(),
        };
        conf.write(contents);
        conf
    }

    pub fn write(&self, contents: &str) {
        std::fs::write(self.path(), contents).unwrap();
    }

    pub fn dir(&self) -> &str {
        self.dir.to_str().unwrap()
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

impl Drop for TempConf {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Watcher that only fires when a test asks it to
#[derive(Default)]
pub struct ManualFileWatcher {
    callbacks: Mutex<HashMap<PathBuf, ReloadCallback>>,
    unregistered: Mutex<Vec<PathBuf>>,
}

impl ManualFileWatcher {
    /// Invoke the callback registered for `path`, as a change would
    pub fn trigger(&self, path: &Path) -> Option<Result<()>> {
        let callback = self.callbacks.lock().unwrap().get(path).cloned();
        callback.map(|callback| callback())
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.callbacks.lock().unwrap().contains_key(path)
    }

    pub fn unregistered(&self) -> Vec<PathBuf> {
        self.unregistered.lock().unwrap().clone()
    }
}

impl FileWatcher for ManualFileWatcher {
    fn register(&self, path: &Path, callback: ReloadCallback) -> Result<()> {
        self.callbacks.lock().unwrap().insert(path.to_path_buf(), callback);
        Ok(())
    }

    fn unregister(&self, path: &Path) {
        self.callbacks.lock().unwrap().remove(path);
        self.unregistered.lock().unwrap().push(path.to_path_buf());
    }
}

/// JSON document describing one pooled service per `(name, naming url)`
pub fn conf_json(services: &[(&str, &str)]) -> String {
    let mut document = serde_json::Map::new();
    for (name, naming) in services {
        document.insert(
            name.to_string(),
            serde_json::json!({
                "naming_service_url": naming,
                "load_balancer_name": "rr",
                "protocol": "http",
                "timeout_ms": 1000,
                "retry": 0,
            }),
        );
    }
    serde_json::Value::Object(document).to_string()
}
