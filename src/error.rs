//! Error taxonomy surfaced to callers
//!
//! Operations return a discriminated outcome rather than panicking or
//! bubbling transport errors directly; [`S3ErrorKind`] is the discriminant
//! carried by every reply, [`S3Error`] the owned error for `Result` interop.

use serde::Serialize;
use thiserror::Error;

/// Error discriminant carried by every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum S3ErrorKind {
    NoError,
    /// Transport-level failure; the message comes from the transport.
    Network,
    Credentials,
    BucketNameInvalid,
    BucketNotFound,
    ObjectNameInvalid,
    ObjectNotFound,
    /// Any other AWS error code; the message is `"<Code>: <Message>"`.
    GenericS3,
    InternalSignature,
    InternalReplyInitialization,
    Internal,
    Unknown,
}

impl S3ErrorKind {
    pub fn is_success(self) -> bool {
        self == S3ErrorKind::NoError
    }
}

/// Owned error form, produced by [`crate::reply::S3Reply::into_result`].
#[derive(Debug, Clone, Error)]
pub enum S3Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("bucket name invalid: {0}")]
    BucketNameInvalid(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("object name invalid: {0}")]
    ObjectNameInvalid(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("{0}")]
    S3(String),

    #[error("signature error: {0}")]
    InternalSignature(String),

    #[error("reply not initialized: {0}")]
    InternalReplyInitialization(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl S3Error {
    pub(crate) fn from_kind(kind: S3ErrorKind, message: String) -> Self {
        match kind {
            // NoError is mapped by callers before reaching here; treat a slip
            // through as an internal inconsistency.
            S3ErrorKind::NoError | S3ErrorKind::Internal => S3Error::Internal(message),
            S3ErrorKind::Network => S3Error::Network(message),
            S3ErrorKind::Credentials => S3Error::Credentials(message),
            S3ErrorKind::BucketNameInvalid => S3Error::BucketNameInvalid(message),
            S3ErrorKind::BucketNotFound => S3Error::BucketNotFound(message),
            S3ErrorKind::ObjectNameInvalid => S3Error::ObjectNameInvalid(message),
            S3ErrorKind::ObjectNotFound => S3Error::ObjectNotFound(message),
            S3ErrorKind::GenericS3 => S3Error::S3(message),
            S3ErrorKind::InternalSignature => S3Error::InternalSignature(message),
            S3ErrorKind::InternalReplyInitialization => {
                S3Error::InternalReplyInitialization(message)
            }
            S3ErrorKind::Unknown => S3Error::Unknown(message),
        }
    }

    pub fn kind(&self) -> S3ErrorKind {
        match self {
            S3Error::Network(_) => S3ErrorKind::Network,
            S3Error::Credentials(_) => S3ErrorKind::Credentials,
            S3Error::BucketNameInvalid(_) => S3ErrorKind::BucketNameInvalid,
            S3Error::BucketNotFound(_) => S3ErrorKind::BucketNotFound,
            S3Error::ObjectNameInvalid(_) => S3ErrorKind::ObjectNameInvalid,
            S3Error::ObjectNotFound(_) => S3ErrorKind::ObjectNotFound,
            S3Error::S3(_) => S3ErrorKind::GenericS3,
            S3Error::InternalSignature(_) => S3ErrorKind::InternalSignature,
            S3Error::InternalReplyInitialization(_) => S3ErrorKind::InternalReplyInitialization,
            S3Error::Internal(_) => S3ErrorKind::Internal,
            S3Error::Unknown(_) => S3ErrorKind::Unknown,
        }
    }
}
