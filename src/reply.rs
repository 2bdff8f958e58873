//! Typed operation replies
//!
//! Every operation returns an [`S3Reply<T>`]: the shared outcome fields
//! (error kind and message, transport message, raw response data) plus a
//! payload typed per operation. Errors are carried as data, never panics.

use crate::error::{S3Error, S3ErrorKind};
use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::StatusCode;

/// The shared, payload-independent part of a reply. Immutable once built.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub(crate) network_error: Option<String>,
    pub(crate) error_kind: S3ErrorKind,
    pub(crate) error_message: String,
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Outcome {
    /// Successful exchange; error kind `NoError`.
    pub(crate) fn success(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            network_error: None,
            error_kind: S3ErrorKind::NoError,
            error_message: String::new(),
            status: Some(status),
            headers,
            body,
        }
    }

    /// Failure detected before or after the exchange.
    pub(crate) fn error(kind: S3ErrorKind, message: impl Into<String>) -> Self {
        Self {
            network_error: None,
            error_kind: kind,
            error_message: message.into(),
            status: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub(crate) fn is_success(&self) -> bool {
        self.error_kind.is_success()
    }
}

/// Reply for one operation, generic over the success payload.
#[derive(Debug, Clone)]
pub struct S3Reply<T> {
    outcome: Outcome,
    value: Option<T>,
}

impl<T> S3Reply<T> {
    pub(crate) fn from_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            value: None,
        }
    }

    pub(crate) fn with_value(outcome: Outcome, value: T) -> Self {
        Self {
            outcome,
            value: Some(value),
        }
    }

    pub(crate) fn into_outcome(self) -> Outcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn error_kind(&self) -> S3ErrorKind {
        self.outcome.error_kind
    }

    /// The S3-level error message; empty on success.
    pub fn error_message(&self) -> &str {
        &self.outcome.error_message
    }

    /// The transport-level error message, if the transport reported one.
    pub fn network_error(&self) -> Option<&str> {
        self.outcome.network_error.as_deref()
    }

    /// The transport message when present, otherwise the S3 message; empty on
    /// success.
    pub fn any_error_string(&self) -> &str {
        match self.outcome.network_error.as_deref() {
            Some(network) => network,
            None => &self.outcome.error_message,
        }
    }

    /// HTTP status of the exchange, when one took place.
    pub fn status(&self) -> Option<StatusCode> {
        self.outcome.status
    }

    /// A response header value, when the exchange produced one.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.outcome.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The verbatim response body as returned by the server.
    pub fn raw_body(&self) -> &Bytes {
        &self.outcome.body
    }

    /// The operation payload; `None` unless the operation succeeded with one.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Converts into a `Result`, consuming the reply.
    pub fn into_result(self) -> Result<T, S3Error> {
        if self.outcome.is_success() {
            match self.value {
                Some(value) => Ok(value),
                None => Err(S3Error::Internal(
                    "reply succeeded without a payload".to_string(),
                )),
            }
        } else {
            let message = match self.outcome.network_error {
                Some(network) if self.outcome.error_message.is_empty() => network,
                _ => self.outcome.error_message,
            };
            Err(S3Error::from_kind(self.outcome.error_kind, message))
        }
    }
}
