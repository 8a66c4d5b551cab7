use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::client::ObjectInfo;
use crate::error::Underlying;

/// Data handed to [`Volume::write`](crate::Volume::write).
pub enum Content {
    Bytes(Bytes),
    Text(String),
    /// Piped to the backend as it becomes available.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl Content {
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Content::Stream(Box::new(reader))
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Content::Text(t) => f.debug_tuple("Text").field(&t.len()).finish(),
            Content::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<Vec<u8>> for Content {
    fn from(v: Vec<u8>) -> Self {
        Content::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for Content {
    fn from(v: &[u8]) -> Self {
        Content::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Bytes> for Content {
    fn from(b: Bytes) -> Self {
        Content::Bytes(b)
    }
}

/// Text encodings understood by `read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
    Hex,
}

impl Encoding {
    pub fn decode(self, data: &[u8]) -> Result<String, Underlying> {
        match self {
            Encoding::Utf8 => String::from_utf8(data.to_vec())
                .map_err(|e| Underlying::new("InvalidData", e.to_string())),
            Encoding::Latin1 => Ok(data.iter().map(|&b| b as char).collect()),
            Encoding::Hex => Ok(hex::encode(data)),
        }
    }
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            "hex" => Ok(Encoding::Hex),
            _ => Err(format!("unknown encoding: {s} (supported: utf-8, latin1, hex)")),
        }
    }
}

/// Content returned by `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Bytes),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(t) => Some(t),
            Payload::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(t) => t.as_bytes(),
            Payload::Bytes(b) => b,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Text(t) => Bytes::from(t),
            Payload::Bytes(b) => b,
        }
    }

    pub(crate) fn decode(data: Bytes, options: &ReadOptions) -> Result<Self, Underlying> {
        if options.as_bytes {
            Ok(Payload::Bytes(data))
        } else {
            options.encoding.decode(&data).map(Payload::Text)
        }
    }
}

/// Extra request parameters passed through to object stores. The
/// filesystem driver has no request to extend and ignores them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    /// Added to every request of the operation, e.g.
    /// `x-amz-server-side-encryption` or `x-amz-meta-*`.
    pub headers: BTreeMap<String, String>,
    /// Appended to the request URL.
    pub query: BTreeMap<String, String>,
}

impl RequestParams {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.query.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Return the exact bytes instead of decoded text.
    pub as_bytes: bool,
    pub encoding: Encoding,
    pub params: RequestParams,
}

impl ReadOptions {
    pub fn bytes() -> Self {
        Self {
            as_bytes: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Overrides the content type sent to object stores.
    pub content_type: Option<String>,
    pub params: RequestParams,
}

#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub overwrite: bool,
    pub params: RequestParams,
}

#[derive(Debug, Clone)]
pub struct MoveOptions {
    pub overwrite: bool,
    pub params: RequestParams,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            params: RequestParams::default(),
        }
    }
}

/// Backend-native metadata carried on every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Raw {
    #[default]
    None,
    File(FileMeta),
    Object(ObjectInfo),
    /// The native response of a probe that answered "missing".
    Missing(Underlying),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMeta {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl FileMeta {
    pub(crate) fn from_metadata(path: PathBuf, meta: &std::fs::Metadata) -> Self {
        Self {
            path,
            len: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

/// Record produced by `read` and `list`. `path` is always relative to the
/// volume root.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub path: String,
    pub content: Option<Payload>,
    pub raw: Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exists {
    pub exists: bool,
    pub raw: Raw,
}

/// Result of `write`, `copy` and `rename`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub raw: Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    /// `Some(false)` when nothing was there, `None` when the backend cannot
    /// tell.
    pub deleted: Option<bool>,
    pub raw: Raw,
}
