//! Async HTTP transport boundary
//!
//! The engine drives exactly one transport object from its worker thread; the
//! [`Transport`] trait is the seam between the two. `begin` resolves as soon
//! as response headers arrive and hands back the body as a separate future,
//! which is what lets the engine treat header arrival as completion for HEAD
//! requests whose bodies the server never closes promptly.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::{Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("operation canceled")]
    Canceled,

    #[error("request failed: {0}")]
    Request(String),

    #[error("response body error: {0}")]
    Body(String),

    #[error("network worker stopped")]
    WorkerStopped,
}

/// A fully built, signed HTTP request ready for the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response headers plus the still-pending body.
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: LocalBoxFuture<'static, Result<Bytes, TransportError>>,
}

/// One in-flight HTTP exchange provider. Implementations are owned by the
/// engine's worker thread and are only ever called from it.
#[async_trait(?Send)]
pub trait Transport {
    async fn begin(&self, request: WireRequest) -> Result<ResponseHead, TransportError>;
}

/// hyper-based HTTPS transport.
///
/// HTTP/1.1 with a tuned connection pool; the pool bounds how many of the
/// engine's in-flight requests hold real connections at once, queueing the
/// rest internally.
pub struct HttpsTransport {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpsTransport {
    pub fn new() -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = TlsConnector::new().expect("failed to build TLS connector");
        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(6)
            .set_host(false)
            .build(https);

        Self { client }
    }
}

impl Default for HttpsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Transport for HttpsTransport {
    async fn begin(&self, request: WireRequest) -> Result<ResponseHead, TransportError> {
        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let http_request = builder
            .body(Full::new(request.body))
            .map_err(|e| TransportError::Request(format!("request build error: {e}")))?;

        let response = self
            .client
            .request(http_request)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body();
        let body = async move {
            body.collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(|e| TransportError::Body(e.to_string()))
        }
        .boxed_local();

        Ok(ResponseHead {
            status,
            headers,
            body,
        })
    }
}
