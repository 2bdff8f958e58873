//! Synchronous S3 client
//!
//! Composes the pieces: input validation, bucket-region resolution, signing
//! key management, SigV4 signing, execution through the blocking engine, and
//! interpretation of the response (including AWS XML error bodies) into a
//! typed reply.
//!
//! Data flow for a request:
//!
//! ```text
//!                    AWS secret key ->
//!                            Date   -> signing
//!                           Region  ->   key    ----------------|
//!                           Service ->                          |
//!                                                               |
//!    headers: Host, X-Amz-Date                                 |
//!        |                                                      |
//!    request -> canonical request -> hash -> string to sign -> signature
//!        |                                                          |
//!    signed request  <--------- Authorization header ---------------
//!        |
//!    blocking engine -> typed reply
//! ```

use crate::config::Config;
use crate::engine::{
    HttpsTransport, SyncNetworkEngine, Transport, TransportError, WireRequest, WireResponse,
};
use crate::error::S3ErrorKind;
use crate::keys::SigningKeyCache;
use crate::regions::BucketRegionCache;
use crate::reply::{Outcome, S3Reply};
use crate::{signer, xml};
use bytes::Bytes;
use chrono::Utc;
use hyper::header::{HeaderMap, CONTENT_LENGTH};
use hyper::Method;
use std::sync::Arc;

/// Supplier of a current credential value, invoked per use so secrets are not
/// retained between calls.
pub type CredentialProvider = Arc<dyn Fn() -> String + Send + Sync>;

const S3_SERVICE: &str = "s3";
const DEFAULT_ENDPOINT: &str = "s3.amazonaws.com";
/// Bucket-location queries are region-agnostic and always signed against the
/// default US region.
const LOCATION_REGION: &str = "us-east-1";

/// Thread-safe blocking S3 client. One instance serves any number of caller
/// threads; every operation blocks its caller until the exchange completes.
pub struct S3Client {
    access_key_id_provider: CredentialProvider,
    secret_access_key_provider: CredentialProvider,
    endpoint: String,
    signing_keys: SigningKeyCache,
    bucket_regions: BucketRegionCache,
    engine: SyncNetworkEngine,
}

impl S3Client {
    /// Creates a client with static credentials.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        let id = access_key_id.to_string();
        let secret = secret_access_key.to_string();
        Self::with_providers(Arc::new(move || id.clone()), Arc::new(move || secret.clone()))
    }

    /// Creates a client with credential suppliers, so secrets can be fetched
    /// on demand instead of being stored.
    pub fn with_providers(
        access_key_id_provider: CredentialProvider,
        secret_access_key_provider: CredentialProvider,
    ) -> Self {
        Self::with_transport(
            Box::new(HttpsTransport::new()),
            access_key_id_provider,
            secret_access_key_provider,
        )
    }

    /// Creates a client from a loaded configuration profile.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.access_key_id, &config.secret_access_key)
            .with_endpoint(config.endpoint.clone())
    }

    /// Creates a client over a caller-supplied transport. This is the seam
    /// used by tests; production callers normally want [`S3Client::new`].
    pub fn with_transport(
        transport: Box<dyn Transport + Send>,
        access_key_id_provider: CredentialProvider,
        secret_access_key_provider: CredentialProvider,
    ) -> Self {
        if access_key_id_provider().is_empty() {
            tracing::warn!("access key id not specified");
        }
        if secret_access_key_provider().is_empty() {
            tracing::warn!("secret access key not set");
        }

        Self {
            access_key_id_provider,
            secret_access_key_provider,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            signing_keys: SigningKeyCache::new(),
            bucket_regions: BucketRegionCache::new(),
            engine: SyncNetworkEngine::new(transport),
        }
    }

    /// Overrides the endpoint host suffix (for S3-compatible services).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Looks up the region a bucket lives in.
    pub fn location(&self, bucket: &str) -> S3Reply<String> {
        tracing::debug!(bucket, "location");
        self.location_impl(bucket)
    }

    /// Stores an object.
    pub fn put(&self, bucket: &str, path: &str, content: impl Into<Bytes>) -> S3Reply<()> {
        self.put_with_headers(bucket, path, content, &[])
    }

    /// Stores an object with caller-supplied request headers (for example
    /// `Content-Type`); the headers become part of the signed set.
    pub fn put_with_headers(
        &self,
        bucket: &str,
        path: &str,
        content: impl Into<Bytes>,
        headers: &[(String, String)],
    ) -> S3Reply<()> {
        tracing::debug!(bucket, path, "put");
        let outcome =
            self.process_s3_request(Method::PUT, bucket, path, "", content.into(), headers);
        if outcome.is_success() {
            S3Reply::with_value(outcome, ())
        } else {
            S3Reply::from_outcome(outcome)
        }
    }

    /// Tests whether an object exists, via a HEAD request.
    pub fn exists(&self, bucket: &str, path: &str) -> S3Reply<bool> {
        tracing::debug!(bucket, path, "exists");
        let mut outcome =
            self.process_s3_request(Method::HEAD, bucket, path, "", Bytes::new(), &[]);

        // S3 holds HEAD connections open past the response, so the exchange
        // can surface as a transport failure; an x-amz-request-id header means
        // S3 answered and the content-length check can proceed. No headers at
        // all is a real transport failure, returned as-is.
        if outcome.headers.get("x-amz-request-id").is_none() {
            return S3Reply::from_outcome(outcome);
        }

        outcome.error_kind = S3ErrorKind::NoError;
        outcome.error_message.clear();

        let present = Self::content_length(&outcome.headers).is_some();
        S3Reply::with_value(outcome, present)
    }

    /// Returns an object's size in bytes, via a HEAD request.
    pub fn size(&self, bucket: &str, path: &str) -> S3Reply<u64> {
        tracing::debug!(bucket, path, "size");
        let mut outcome =
            self.process_s3_request(Method::HEAD, bucket, path, "", Bytes::new(), &[]);

        if outcome.headers.get("x-amz-request-id").is_none() {
            return S3Reply::from_outcome(outcome);
        }

        // Existence is detected by the presence of Content-Length.
        match Self::content_length(&outcome.headers) {
            Some(size) => {
                outcome.error_kind = S3ErrorKind::NoError;
                outcome.error_message.clear();
                S3Reply::with_value(outcome, size)
            }
            None => {
                outcome.error_kind = S3ErrorKind::ObjectNotFound;
                outcome.error_message = "Object Not Found".to_string();
                S3Reply::from_outcome(outcome)
            }
        }
    }

    /// Fetches an object's contents.
    pub fn get(&self, bucket: &str, path: &str) -> S3Reply<Bytes> {
        tracing::debug!(bucket, path, "get");
        let outcome = self.process_s3_request(Method::GET, bucket, path, "", Bytes::new(), &[]);
        if outcome.is_success() {
            let content = outcome.body.clone();
            S3Reply::with_value(outcome, content)
        } else {
            S3Reply::from_outcome(outcome)
        }
    }

    /// Deletes an object.
    pub fn remove(&self, bucket: &str, path: &str) -> S3Reply<()> {
        tracing::debug!(bucket, path, "remove");
        let outcome = self.process_s3_request(Method::DELETE, bucket, path, "", Bytes::new(), &[]);
        if outcome.is_success() {
            S3Reply::with_value(outcome, ())
        } else {
            S3Reply::from_outcome(outcome)
        }
    }

    /// Empties the signing-key and bucket-region caches. Call when a bucket
    /// has moved region.
    pub fn clear_caches(&self) {
        self.signing_keys.clear();
        self.bucket_regions.clear();
    }

    /// Current access key id, fetched from the configured supplier.
    pub fn access_key_id(&self) -> String {
        (self.access_key_id_provider)()
    }

    /// Current secret access key, fetched from the configured supplier.
    pub fn secret_access_key(&self) -> String {
        (self.secret_access_key_provider)()
    }

    /// Aborts every in-flight operation; their calls return a failure outcome.
    /// New operations may still be started.
    pub fn cancel_all(&self) {
        self.engine.cancel_all();
    }

    /// Blocks until no operations are in flight.
    pub fn wait_for_all(&self) {
        self.engine.wait_for_all();
    }

    /// Number of operations currently in flight.
    pub fn pending_requests(&self) -> usize {
        self.engine.pending_count()
    }

    fn check_bucket_name(&self, bucket: &str) -> Option<Outcome> {
        if bucket.is_empty() {
            return Some(Outcome::error(
                S3ErrorKind::BucketNameInvalid,
                "Bucket name is empty",
            ));
        }
        None
    }

    fn check_path(&self, path: &str) -> Option<Outcome> {
        if path.is_empty() {
            return Some(Outcome::error(
                S3ErrorKind::ObjectNameInvalid,
                "Object name is empty",
            ));
        }
        None
    }

    fn check_credentials(&self) -> Option<Outcome> {
        if self.access_key_id().is_empty() {
            return Some(Outcome::error(
                S3ErrorKind::Credentials,
                "Access key id is empty",
            ));
        }
        if self.secret_access_key().is_empty() {
            return Some(Outcome::error(
                S3ErrorKind::Credentials,
                "Secret access key is empty",
            ));
        }
        None
    }

    /// Resolves the bucket's region, populating the cache on a miss. Two
    /// threads racing an unseen bucket each complete their own lookup; the
    /// first insert wins and both results are correct.
    fn resolve_region(&self, bucket: &str) -> Result<String, Outcome> {
        if let Some(region) = self.bucket_regions.lookup(bucket) {
            return Ok(region);
        }

        let reply = self.location_impl(bucket);
        if !reply.is_success() {
            return Err(reply.into_outcome());
        }
        let region = reply
            .value()
            .cloned()
            .unwrap_or_else(|| LOCATION_REGION.to_string());

        if self.bucket_regions.insert_if_absent(bucket, &region) {
            tracing::debug!(bucket, region = %region, "cached bucket region");
        }
        Ok(region)
    }

    /// Builds and signs a request. The signing key for the region is taken
    /// from the cache, re-deriving it when stale.
    #[allow(clippy::too_many_arguments)]
    fn create_signed_request(
        &self,
        method: Method,
        host: &str,
        uri_path: &str,
        query: &str,
        extra_headers: &[(String, String)],
        payload: Bytes,
        region: &str,
    ) -> WireRequest {
        let now = Utc::now();
        let (signing_key, _) = self.signing_keys.ensure_key(
            region,
            now,
            || self.secret_access_key(),
            S3_SERVICE,
        );

        let mut headers: Vec<(String, String)> = extra_headers.to_vec();
        headers.push((
            "User-Agent".to_string(),
            concat!("s3bridge/", env!("CARGO_PKG_VERSION")).to_string(),
        ));
        headers.push(("Host".to_string(), host.to_string()));
        headers.push(("X-Amz-Date".to_string(), signer::format_date_time(&now)));

        signer::sign_request(
            &mut headers,
            method.as_str(),
            uri_path,
            query,
            &payload,
            &self.access_key_id(),
            &signing_key,
            &now,
            region,
            S3_SERVICE,
        );

        let mut url = format!("https://{host}{uri_path}");
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        WireRequest {
            method,
            url,
            headers,
            body: payload,
        }
    }

    /// Validates, resolves, signs, executes, and interprets one bucket/object
    /// request, returning the shared outcome for the operation to specialize.
    fn process_s3_request(
        &self,
        method: Method,
        bucket: &str,
        path: &str,
        query: &str,
        payload: Bytes,
        extra_headers: &[(String, String)],
    ) -> Outcome {
        if let Some(outcome) = self.check_bucket_name(bucket) {
            return outcome;
        }
        if let Some(outcome) = self.check_path(path) {
            return outcome;
        }
        if let Some(outcome) = self.check_credentials() {
            return outcome;
        }
        let region = match self.resolve_region(bucket) {
            Ok(region) => region,
            Err(outcome) => return outcome,
        };

        let host = format!("{bucket}.{}", self.endpoint);
        let uri_path = format!("/{path}");
        let request = self.create_signed_request(
            method,
            &host,
            &uri_path,
            query,
            extra_headers,
            payload,
            &region,
        );

        Self::interpret(self.engine.execute(request))
    }

    /// The bucket-location probe: `GET https://<endpoint>/<bucket>?location`,
    /// always signed against the default US region. An empty
    /// `LocationConstraint` in the response means exactly that region.
    fn location_impl(&self, bucket: &str) -> S3Reply<String> {
        if let Some(outcome) = self.check_bucket_name(bucket) {
            return S3Reply::from_outcome(outcome);
        }
        if let Some(outcome) = self.check_credentials() {
            return S3Reply::from_outcome(outcome);
        }

        let host = self.endpoint.clone();
        let request = self.create_signed_request(
            Method::GET,
            &host,
            &format!("/{bucket}"),
            "location",
            &[],
            Bytes::new(),
            LOCATION_REGION,
        );

        let outcome = Self::interpret(self.engine.execute(request));
        if !outcome.is_success() {
            return S3Reply::from_outcome(outcome);
        }

        let components = xml::tag_text(&outcome.body);
        let mut location = components
            .get("LocationConstraint")
            .cloned()
            .unwrap_or_default();
        if location.is_empty() {
            location = LOCATION_REGION.to_string();
        }
        S3Reply::with_value(outcome, location)
    }

    /// Maps the engine result to an outcome. A transport failure or non-2xx
    /// status defaults to a network error; a recognized AWS XML error body
    /// overrides it with the more specific S3 error.
    fn interpret(result: Result<WireResponse, TransportError>) -> Outcome {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                return Outcome {
                    network_error: Some(message.clone()),
                    error_kind: S3ErrorKind::Network,
                    error_message: message,
                    status: None,
                    headers: HeaderMap::new(),
                    body: Bytes::new(),
                };
            }
        };

        if response.status.is_success() {
            return Outcome::success(response.status, response.headers, response.body);
        }

        let status_message = format!("HTTP {}", response.status);
        let mut outcome = Outcome {
            network_error: Some(status_message.clone()),
            error_kind: S3ErrorKind::Network,
            error_message: status_message,
            status: Some(response.status),
            headers: response.headers,
            body: response.body,
        };
        if outcome.body.is_empty() {
            return outcome;
        }

        // Errors: http://docs.aws.amazon.com/AmazonS3/latest/API/ErrorResponses.html
        let components = xml::tag_text(&outcome.body);
        if components.contains_key("Error") {
            let code = components.get("Code").map(String::as_str).unwrap_or("");
            outcome.error_message.clear();
            match code {
                "NoSuchBucket" => outcome.error_kind = S3ErrorKind::BucketNotFound,
                "NoSuchKey" => outcome.error_kind = S3ErrorKind::ObjectNotFound,
                _ => {
                    outcome.error_kind = S3ErrorKind::GenericS3;
                    outcome.error_message.push_str(code);
                    outcome.error_message.push_str(": ");
                }
            }
            if let Some(message) = components.get("Message") {
                outcome.error_message.push_str(message);
            }
        }
        outcome
    }

    fn content_length(headers: &HeaderMap) -> Option<u64> {
        headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }
}
