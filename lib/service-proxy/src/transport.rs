//! Transport seam shared by the pooled and single-shot backends

use crate::headers::RequestHeaders;
use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::{Method, Request, Uri};
use service_api::{CallRequest, HttpMethod, ServiceChannelSpec};
use std::time::Instant;
use thiserror::Error;

/// A call request with headers resolved against the service's configuration
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    pub fn prepare(spec: &ServiceChannelSpec, request: &CallRequest) -> Result<Self, String> {
        let headers = RequestHeaders::new(spec.headers.iter().chain(request.headers.iter()))?;

        // Only POST carries a body
        let (method, body) = match request.method {
            HttpMethod::Get => (Method::GET, Bytes::new()),
            HttpMethod::Post => (Method::POST, Bytes::from(request.payload.clone())),
        };

        Ok(Self {
            url: request.url.clone(),
            method,
            headers: headers.to_header_map(),
            body,
        })
    }

    /// Path and query of the url, with any scheme and authority removed
    pub fn path_and_query(&self) -> String {
        let path = match self.url.parse::<Uri>() {
            Ok(uri) if uri.scheme().is_some() => uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_default(),
            Ok(uri) => uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| self.url.clone()),
            Err(_) => self.url.clone(),
        };

        if path.is_empty() {
            "/".to_string()
        } else if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        }
    }

    /// Build a hyper request targeting `uri`
    pub fn to_request(&self, uri: Uri) -> Request<Full<Bytes>> {
        let mut request = Request::new(Full::new(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = self.headers.clone();
        request
    }
}

/// Successful transport-level response
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
    pub remote_side: String,
    pub latency_ms: u64,
}

/// Transport-level failure with whatever was known when it happened
#[derive(Error, Clone, Debug)]
#[error("{reason}")]
pub struct TransportError {
    pub reason: String,
    pub remote_side: Option<String>,
    pub latency_ms: Option<u64>,
}

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            remote_side: None,
            latency_ms: None,
        }
    }

    pub fn at(mut self, remote_side: impl Into<String>, started: Instant) -> Self {
        self.remote_side = Some(remote_side.into());
        self.latency_ms = Some(elapsed_ms(started));
        self
    }
}

/// A way of executing an HTTP call for a service
#[async_trait]
pub trait HttpTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(
        &self,
        spec: &ServiceChannelSpec,
        request: &OutboundRequest,
    ) -> Result<TransportResponse, TransportError>;
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Render an error with its chain of sources
pub(crate) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
