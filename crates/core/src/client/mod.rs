//! Remote object-store clients.
//!
//! [`S3Volume`](crate::backend::s3::S3Volume) talks to its bucket only
//! through [`ObjectClient`], so the production client ([`BucketClient`],
//! built on rust-s3) and the in-memory [`MemoryClient`] are interchangeable.

pub mod memory;
pub mod rust_s3;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

pub use memory::MemoryClient;
pub use rust_s3::BucketClient;

use crate::entry::RequestParams;
use crate::error::Result;

/// Metadata the store returned for a single object or request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// One response of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectInfo>,
    /// Present while more pages remain.
    pub next_token: Option<String>,
}

/// A fully-qualified object reference, used as the source of server-side
/// copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.bucket, self.key)
    }
}

/// Failure reported by a client before the driver translates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    /// HTTP status, when the request reached the store.
    pub status: Option<u16>,
    /// S3 error code such as `NoSuchKey`.
    pub code: Option<String>,
    pub message: String,
}

impl ClientError {
    pub fn new(status: Option<u16>, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// True for a missing key. A missing bucket is not a missing key, even
    /// though both answer 404.
    pub fn is_missing(&self) -> bool {
        match self.code.as_deref() {
            Some(code) => code == "NoSuchKey" || code == "NotFound",
            None => self.status == Some(404),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, self.status) {
            (Some(code), Some(status)) => write!(f, "{code} ({status}): {}", self.message),
            (Some(code), None) => write!(f, "{code}: {}", self.message),
            (None, Some(status)) => write!(f, "HTTP {status}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ClientError {}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Handle on a single bucket. `params` extends each request with extra
/// headers and query parameters.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo>;

    /// Multipart-capable upload of a reader of unknown length.
    async fn put_object_stream(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        content_type: Option<&str>,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo>;

    async fn head_object(&self, key: &str, params: &RequestParams) -> ClientResult<ObjectInfo>;

    async fn get_object(
        &self,
        key: &str,
        params: &RequestParams,
    ) -> ClientResult<(Bytes, ObjectInfo)>;

    /// Server-side copy; no object bytes pass through the caller.
    async fn copy_object(
        &self,
        source: &ObjectLocation,
        key: &str,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo>;

    /// Stores answer success whether or not the key existed.
    async fn delete_object(&self, key: &str, params: &RequestParams) -> ClientResult<ObjectInfo>;

    async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: usize,
        params: &RequestParams,
    ) -> ClientResult<ObjectPage>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
}

/// Connection settings handed to a [`ClientFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub region: String,
    /// Custom endpoint for MinIO, R2 or a local development server.
    pub endpoint: Option<String>,
    pub credentials: Option<StaticCredentials>,
    pub path_style: bool,
}

/// Builds the client an [`S3Volume`](crate::backend::s3::S3Volume) uses.
/// Swapped out in tests to avoid talking to a real store.
pub type ClientFactory =
    Arc<dyn Fn(&str, &ClientOptions) -> Result<Arc<dyn ObjectClient>> + Send + Sync>;

/// Factory producing [`BucketClient`]s.
pub fn default_factory() -> ClientFactory {
    Arc::new(|bucket: &str, options: &ClientOptions| {
        let client = BucketClient::connect(bucket, options)?;
        Ok(Arc::new(client) as Arc<dyn ObjectClient>)
    })
}

/// Factory that hands out the same client for every bucket.
pub fn shared_factory(client: Arc<dyn ObjectClient>) -> ClientFactory {
    Arc::new(move |_: &str, _: &ClientOptions| Ok(client.clone()))
}
