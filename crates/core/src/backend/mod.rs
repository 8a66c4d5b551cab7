pub mod local;
pub mod s3;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::entry::{
    Content, CopyOptions, Entry, Exists, MoveOptions, Outcome, ReadOptions, Removed,
    RequestParams, WriteOptions,
};
use crate::error::Result;

/// Lazy sequence of entries produced by [`Volume::list`]. Each poll may
/// suspend on backend I/O; nothing is fetched before it is asked for.
pub type EntryStream<'a> = BoxStream<'a, Result<Entry>>;

/// The operation set every storage driver provides.
///
/// Paths are relative to the volume root and use `/` as separator. Any
/// backend failure is translated into [`crate::Error`] before it is returned.
/// Every operation carries [`RequestParams`]; drivers without a request to
/// extend ignore them.
#[async_trait]
pub trait Volume: Send + Sync {
    /// Protocol name this driver is registered under.
    fn protocol(&self) -> &'static str;

    /// Missing paths answer `false` instead of failing.
    async fn exists(&self, path: &str, params: RequestParams) -> Result<Exists>;

    async fn write(&self, path: &str, content: Content, options: WriteOptions) -> Result<Outcome>;

    async fn read(&self, path: &str, options: ReadOptions) -> Result<Entry>;

    async fn copy(&self, source: &str, target: &str, options: CopyOptions) -> Result<Outcome>;

    /// Moves `source` to `target`.
    async fn rename(&self, source: &str, target: &str, options: MoveOptions) -> Result<Outcome>;

    async fn remove(&self, path: &str, params: RequestParams) -> Result<Removed>;

    /// Every file whose path starts with `prefix`, depth first. Each call
    /// starts a fresh traversal.
    fn list<'a>(&'a self, prefix: &str, params: RequestParams) -> EntryStream<'a>;
}
