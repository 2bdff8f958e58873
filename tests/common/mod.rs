//! Shared test transport
//!
//! A scriptable [`Transport`] implementation so engine and client behavior can
//! be exercised without a network: responses are selected per request by a
//! caller-supplied routing closure, and every request that reaches the
//! transport is recorded for assertions.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::StatusCode;
use s3bridge::engine::transport::{ResponseHead, Transport, TransportError, WireRequest};
use s3bridge::client::CredentialProvider;
use s3bridge::S3Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_ACCESS_KEY_ID: &str = "AKIDEXAMPLE";
pub const TEST_SECRET_ACCESS_KEY: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

/// What the transport should do with one request.
pub enum MockBehavior {
    /// Complete response: headers plus body.
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Bytes,
    },
    /// Like `Respond`, after a delay (a slow exchange).
    RespondAfter {
        delay: Duration,
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Bytes,
    },
    /// Headers arrive but the body never completes (S3's HEAD behavior).
    HeadersOnly {
        status: u16,
        headers: Vec<(&'static str, String)>,
    },
    /// The exchange never produces anything until aborted.
    Stall,
    /// Transport-level failure.
    Fail(String),
}

type Router = Box<dyn Fn(&WireRequest) -> MockBehavior + Send + Sync>;

pub struct MockTransport {
    pub requests: Arc<Mutex<Vec<WireRequest>>>,
    router: Router,
}

impl MockTransport {
    pub fn new(router: impl Fn(&WireRequest) -> MockBehavior + Send + Sync + 'static) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            router: Box::new(router),
        }
    }
}

#[async_trait(?Send)]
impl Transport for MockTransport {
    async fn begin(&self, request: WireRequest) -> Result<ResponseHead, TransportError> {
        let behavior = (self.router)(&request);
        self.requests.lock().unwrap().push(request);

        match behavior {
            MockBehavior::Respond {
                status,
                headers,
                body,
            } => Ok(head(status, &headers, futures::future::ready(Ok(body)).boxed_local())),
            MockBehavior::RespondAfter {
                delay,
                status,
                headers,
                body,
            } => {
                tokio::time::sleep(delay).await;
                Ok(head(status, &headers, futures::future::ready(Ok(body)).boxed_local()))
            }
            MockBehavior::HeadersOnly { status, headers } => {
                Ok(head(status, &headers, futures::future::pending().boxed_local()))
            }
            MockBehavior::Stall => {
                futures::future::pending::<()>().await;
                unreachable!("stalled request only ends by abort")
            }
            MockBehavior::Fail(message) => Err(TransportError::Request(message)),
        }
    }
}

fn head(
    status: u16,
    headers: &[(&'static str, String)],
    body: futures::future::LocalBoxFuture<'static, Result<Bytes, TransportError>>,
) -> ResponseHead {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).expect("test header value"),
        );
    }
    ResponseHead {
        status: StatusCode::from_u16(status).expect("test status code"),
        headers: map,
        body,
    }
}

/// 200 response carrying the marker header S3 puts on every answer.
pub fn ok_body(body: &[u8]) -> MockBehavior {
    MockBehavior::Respond {
        status: 200,
        headers: vec![
            ("x-amz-request-id", "4442587FB7D0A2F9".to_string()),
            ("content-length", body.len().to_string()),
        ],
        body: Bytes::copy_from_slice(body),
    }
}

/// Successful `?location` response.
pub fn location_ok(region: &str) -> MockBehavior {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <LocationConstraint xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">{region}</LocationConstraint>"
    );
    ok_body(body.as_bytes())
}

/// AWS XML error response.
pub fn s3_error(status: u16, code: &str, message: &str) -> MockBehavior {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Error><Code>{code}</Code><Message>{message}</Message></Error>"
    );
    MockBehavior::Respond {
        status,
        headers: vec![("x-amz-request-id", "4442587FB7D0A2F9".to_string())],
        body: Bytes::from(body),
    }
}

pub fn provider(value: &str) -> CredentialProvider {
    let value = value.to_string();
    Arc::new(move || value.clone())
}

/// Client over a mock transport, plus the recorded-request log.
pub fn client_with(
    router: impl Fn(&WireRequest) -> MockBehavior + Send + Sync + 'static,
) -> (S3Client, Arc<Mutex<Vec<WireRequest>>>) {
    let transport = MockTransport::new(router);
    let requests = transport.requests.clone();
    let client = S3Client::with_transport(
        Box::new(transport),
        provider(TEST_ACCESS_KEY_ID),
        provider(TEST_SECRET_ACCESS_KEY),
    );
    (client, requests)
}

/// Spins until `pending` reaches the expected count; panics after a timeout so
/// a scheduling bug fails the test instead of hanging it.
pub fn wait_for_pending(pending: impl Fn() -> usize, expected: usize) {
    wait_until(|| pending() == expected);
}

/// Spins until the condition holds; panics after a timeout so a scheduling
/// bug fails the test instead of hanging it.
pub fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("condition never became true");
}
