use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::{EntryStream, Volume};
use crate::client::{ClientError, ClientFactory, ObjectClient, ObjectInfo, ObjectLocation};
use crate::config::S3Config;
use crate::entry::{
    Content, CopyOptions, Entry, Exists, MoveOptions, Outcome, Payload, Raw, ReadOptions, Removed,
    RequestParams, WriteOptions,
};
use crate::error::{Error, Result, Underlying};
use crate::path::{self, KeyPrefix};

pub const PROTOCOL: &str = "s3";

/// Keys requested per listing page unless configured otherwise.
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Volume backed by a key prefix inside an S3-compatible bucket.
pub struct S3Volume {
    keys: KeyPrefix,
    bucket: String,
    client: Arc<dyn ObjectClient>,
    max_keys: usize,
}

impl S3Volume {
    /// Builds the client once through `factory`; it is reused for the life
    /// of the volume.
    pub fn new(config: &S3Config, factory: &ClientFactory) -> Result<Self> {
        let client = factory(&config.bucket, &config.client)?;
        Ok(Self {
            keys: KeyPrefix::new(&config.root),
            bucket: config.bucket.clone(),
            client,
            max_keys: config.max_keys,
        })
    }

    pub fn with_client(root: &str, client: Arc<dyn ObjectClient>) -> Self {
        Self {
            keys: KeyPrefix::new(root),
            bucket: client.bucket().to_string(),
            client,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn keys(&self) -> &KeyPrefix {
        &self.keys
    }

    fn object_key(&self, path: &str, operation: &'static str) -> Result<String> {
        let key = self.keys.normalize(path)?;
        if key.is_empty() || key.ends_with('/') {
            return Err(Error::MissingArgument {
                operation,
                argument: "path",
            });
        }
        Ok(key)
    }

    fn location(&self, key: String) -> ObjectLocation {
        ObjectLocation {
            bucket: self.bucket.clone(),
            key,
        }
    }
}

#[async_trait]
impl Volume for S3Volume {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    async fn exists(&self, path: &str, params: RequestParams) -> Result<Exists> {
        let key = self.object_key(path, "exists")?;
        match self.client.head_object(&key, &params).await {
            Ok(info) => Ok(Exists {
                exists: true,
                raw: Raw::Object(info),
            }),
            Err(e) if e.is_missing() => Ok(Exists {
                exists: false,
                raw: Raw::Missing(underlying(e)),
            }),
            Err(e) => Err(translate(e, path, &self.bucket)),
        }
    }

    async fn write(&self, path: &str, content: Content, options: WriteOptions) -> Result<Outcome> {
        let key = self.object_key(path, "write")?;
        let content_type = options.content_type.as_deref();
        let params = &options.params;
        let uploaded = match content {
            Content::Bytes(body) => {
                self.client
                    .put_object(&key, body, content_type, params)
                    .await
            }
            Content::Text(text) => {
                self.client
                    .put_object(&key, Bytes::from(text), content_type, params)
                    .await
            }
            Content::Stream(reader) => {
                self.client
                    .put_object_stream(&key, reader, content_type, params)
                    .await
            }
        }
        .map_err(|e| translate(e, path, &self.bucket))?;

        debug!(bucket = %self.bucket, key = %key, "uploaded object");
        Ok(Outcome {
            raw: Raw::Object(uploaded),
        })
    }

    async fn read(&self, path: &str, options: ReadOptions) -> Result<Entry> {
        let key = self.object_key(path, "read")?;
        let (body, info) = self
            .client
            .get_object(&key, &options.params)
            .await
            .map_err(|e| translate(e, path, &self.bucket))?;
        let content = Payload::decode(body, &options).map_err(|underlying| Error::Unknown {
            path: path.to_string(),
            bucket: Some(self.bucket.clone()),
            underlying,
        })?;
        Ok(Entry {
            path: path::clean(path)?,
            content: Some(content),
            raw: Raw::Object(info),
        })
    }

    async fn copy(&self, source: &str, target: &str, options: CopyOptions) -> Result<Outcome> {
        let source_key = self.object_key(source, "copy")?;
        let target_key = self.object_key(target, "copy")?;
        let location = format!("{source} -> {target}");

        if !options.overwrite {
            match self.client.head_object(&target_key, &options.params).await {
                Ok(_) => return Err(Error::target_exists(&location)),
                Err(e) if e.is_missing() => {}
                Err(e) => return Err(translate(e, &location, &self.bucket)),
            }
        }

        let copied = self
            .client
            .copy_object(&self.location(source_key), &target_key, &options.params)
            .await
            .map_err(|e| translate(e, &location, &self.bucket))?;

        debug!(bucket = %self.bucket, source, target, "copied object");
        Ok(Outcome {
            raw: Raw::Object(copied),
        })
    }

    /// Copy followed by a delete of the source. Not atomic: when the delete
    /// fails both keys remain and the delete's error is returned.
    async fn rename(&self, source: &str, target: &str, options: MoveOptions) -> Result<Outcome> {
        let source_key = self.object_key(source, "move")?;
        let target_key = self.object_key(target, "move")?;
        // Copying a key onto itself and then deleting the source would lose it.
        if source_key == target_key {
            let info = self
                .client
                .head_object(&source_key, &options.params)
                .await
                .map_err(|e| translate(e, &format!("{source} -> {target}"), &self.bucket))?;
            debug!(bucket = %self.bucket, key = %source_key, "move onto itself left object in place");
            return Ok(Outcome {
                raw: Raw::Object(info),
            });
        }

        let copied = self
            .copy(
                source,
                target,
                CopyOptions {
                    overwrite: options.overwrite,
                    params: options.params.clone(),
                },
            )
            .await?;

        if let Err(e) = self.remove(source, options.params).await {
            warn!(
                bucket = %self.bucket,
                source,
                target,
                error = %e,
                "move copied the object but could not delete the source; both keys remain"
            );
            return Err(e);
        }
        Ok(copied)
    }

    async fn remove(&self, path: &str, params: RequestParams) -> Result<Removed> {
        if path.trim().is_empty() {
            return Err(Error::MissingArgument {
                operation: "remove",
                argument: "path",
            });
        }
        let key = self.object_key(path, "remove")?;
        let info = self
            .client
            .delete_object(&key, &params)
            .await
            .map_err(|e| translate(e, path, &self.bucket))?;

        debug!(bucket = %self.bucket, key = %key, "deleted object");
        // The store does not say whether anything was there.
        Ok(Removed {
            deleted: None,
            raw: Raw::Object(info),
        })
    }

    fn list<'a>(&'a self, prefix: &str, params: RequestParams) -> EntryStream<'a> {
        let key_prefix = match self.keys.normalize(prefix) {
            Ok(key_prefix) => key_prefix,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let pager = Pager {
            client: self.client.as_ref(),
            keys: &self.keys,
            bucket: &self.bucket,
            key_prefix,
            pattern: prefix.to_string(),
            max_keys: self.max_keys,
            params,
            token: None,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        stream::try_unfold(pager, |mut pager| async move {
            let next = pager.next_object().await?;
            Ok::<_, Error>(next.map(|entry| (entry, pager)))
        })
        .boxed()
    }
}

/// Cursor state for one `list` call. A page is only requested once the
/// previous one has been handed out.
struct Pager<'a> {
    client: &'a dyn ObjectClient,
    keys: &'a KeyPrefix,
    bucket: &'a str,
    key_prefix: String,
    pattern: String,
    max_keys: usize,
    params: RequestParams,
    token: Option<String>,
    buffer: VecDeque<ObjectInfo>,
    exhausted: bool,
}

impl Pager<'_> {
    async fn next_object(&mut self) -> Result<Option<Entry>> {
        loop {
            while let Some(info) = self.buffer.pop_front() {
                // Zero-byte "folder" markers are not files.
                if info.key.ends_with('/') {
                    continue;
                }
                return Ok(Some(Entry {
                    path: self.keys.denormalize(&info.key),
                    content: None,
                    raw: Raw::Object(info),
                }));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .client
                .list_objects(
                    &self.key_prefix,
                    self.token.take(),
                    self.max_keys,
                    &self.params,
                )
                .await
                .map_err(|e| translate(e, &self.pattern, self.bucket))?;
            debug!(
                bucket = self.bucket,
                prefix = %self.key_prefix,
                objects = page.objects.len(),
                "fetched listing page"
            );
            self.exhausted = page.next_token.is_none();
            self.token = page.next_token;
            self.buffer.extend(page.objects);
        }
    }
}

fn underlying(err: ClientError) -> Underlying {
    let code = match (&err.code, err.status) {
        (Some(code), _) => code.clone(),
        (None, Some(status)) => format!("HTTP {status}"),
        (None, None) => "Transport".to_string(),
    };
    Underlying {
        code,
        message: err.message,
        status: err.status,
    }
}

fn translate(err: ClientError, path: &str, bucket: &str) -> Error {
    let code = err.code.clone();
    let status = err.status;
    let underlying = underlying(err);
    let path = path.to_string();
    let unknown = |path, underlying| Error::Unknown {
        path,
        bucket: Some(bucket.to_string()),
        underlying,
    };

    match code.as_deref() {
        Some("NoSuchBucket") => Error::UnknownBucket {
            bucket: bucket.to_string(),
            path,
            underlying,
        },
        Some("NoSuchKey") | Some("NotFound") => Error::NotFound { path, underlying },
        Some("AllAccessDisabled") | Some("AccessDenied") => {
            Error::PermissionRequired { path, underlying }
        }
        Some(_) => unknown(path, underlying),
        None => match status {
            Some(404) => Error::NotFound { path, underlying },
            Some(403) => Error::PermissionRequired { path, underlying },
            _ => unknown(path, underlying),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use futures::TryStreamExt;

    use super::*;
    use crate::client::MemoryClient;
    use crate::client::memory::RecordedRequest;

    fn volume(root: &str) -> (Arc<MemoryClient>, S3Volume) {
        let client = Arc::new(MemoryClient::new("write"));
        let volume = S3Volume::with_client(root, client.clone());
        (client, volume)
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn paths(volume: &S3Volume, prefix: &str) -> BTreeSet<String> {
        volume
            .list(prefix, RequestParams::default())
            .map_ok(|entry| entry.path)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn keys_live_under_root() {
        let (client, volume) = volume("/s3");
        volume
            .write("testing.txt", "This is a text".into(), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(client.keys().await, vec!["s3/testing.txt".to_string()]);

        let entry = volume
            .read("testing.txt", ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(entry.path, "testing.txt");
        assert_eq!(entry.content.unwrap().as_text(), Some("This is a text"));
    }

    #[tokio::test]
    async fn exists_treats_404_as_false() {
        let (_, volume) = volume("s3");
        let missing = volume.exists("nope.txt", RequestParams::default()).await.unwrap();
        assert!(!missing.exists);
        assert!(matches!(missing.raw, Raw::Missing(ref u) if u.status == Some(404)));

        volume.write("yes.txt", "y".into(), WriteOptions::default()).await.unwrap();
        assert!(volume.exists("yes.txt", RequestParams::default()).await.unwrap().exists);
    }

    #[tokio::test]
    async fn write_keeps_content_type() {
        let (_, volume) = volume("");
        let options = WriteOptions {
            content_type: Some("text/plain".into()),
            ..WriteOptions::default()
        };
        let outcome = volume.write("a.txt", "a".into(), options).await.unwrap();
        match outcome.raw {
            Raw::Object(info) => assert_eq!(info.content_type.as_deref(), Some("text/plain")),
            other => panic!("unexpected raw: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_upload() {
        let (_, volume) = volume("s3");
        let body: &'static [u8] = b"\x00\x01streamed";
        volume
            .write("bin/data", Content::stream(body), WriteOptions::default())
            .await
            .unwrap();
        let entry = volume.read("bin/data", ReadOptions::bytes()).await.unwrap();
        assert_eq!(entry.content.unwrap().as_bytes(), body);
    }

    #[tokio::test]
    async fn remove_reports_unknown_deletion() {
        let (_, volume) = volume("s3");
        let removed = volume.remove("never-written.txt", RequestParams::default()).await.unwrap();
        assert_eq!(removed.deleted, None);

        let err = volume.remove("", RequestParams::default()).await.unwrap_err();
        assert_eq!(err.code(), "ERR_MISSING_ARGUMENT");
    }

    #[tokio::test]
    async fn copy_is_server_side_and_respects_overwrite() {
        let (_, volume) = volume("s3");
        volume.write("a.txt", "a".into(), WriteOptions::default()).await.unwrap();
        volume.write("b.txt", "b".into(), WriteOptions::default()).await.unwrap();

        let err = volume
            .copy("a.txt", "b.txt", CopyOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Use overwrite option."));

        volume.copy("a.txt", "c.txt", CopyOptions::default()).await.unwrap();
        let entry = volume.read("c.txt", ReadOptions::default()).await.unwrap();
        assert_eq!(entry.content.unwrap().as_text(), Some("a"));
        assert!(volume.exists("a.txt", RequestParams::default()).await.unwrap().exists);
    }

    #[tokio::test]
    async fn copy_missing_source_is_not_found() {
        let (_, volume) = volume("s3");
        let err = volume
            .copy("ghost.txt", "b.txt", CopyOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.data().path.as_deref(), Some("ghost.txt -> b.txt"));
    }

    #[tokio::test]
    async fn rename_moves_object() {
        let (client, volume) = volume("s3");
        volume.write("a.txt", "a".into(), WriteOptions::default()).await.unwrap();
        volume
            .rename("a.txt", "moved.txt", MoveOptions::default())
            .await
            .unwrap();
        assert_eq!(client.keys().await, vec!["s3/moved.txt".to_string()]);
    }

    #[tokio::test]
    async fn rename_onto_same_key_keeps_object() {
        let (client, volume) = volume("s3");
        volume
            .write("a.txt", "keep me".into(), WriteOptions::default())
            .await
            .unwrap();
        volume
            .rename("a.txt", "./a.txt", MoveOptions::default())
            .await
            .unwrap();

        assert_eq!(client.keys().await, vec!["s3/a.txt".to_string()]);
        let entry = volume.read("a.txt", ReadOptions::default()).await.unwrap();
        assert_eq!(entry.content.unwrap().as_text(), Some("keep me"));
        assert!(client.requests().iter().all(|r| r.operation != "delete_object"));

        let err = volume
            .rename("ghost.txt", "sub/../ghost.txt", MoveOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn failed_delete_leaves_both_copies() {
        let (client, volume) = volume("s3");
        volume.write("a.txt", "a".into(), WriteOptions::default()).await.unwrap();
        client.deny_deletes(true);

        let err = volume
            .rename("a.txt", "b.txt", MoveOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_PERMISSION_REQUIRED");
        assert_eq!(
            client.keys().await,
            vec!["s3/a.txt".to_string(), "s3/b.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn request_params_reach_the_client() {
        let (client, volume) = volume("s3");
        let params = RequestParams::default()
            .with_header("x-amz-meta-owner", "ops")
            .with_query("versionId", "7");

        volume
            .write(
                "a.txt",
                "a".into(),
                WriteOptions {
                    params: params.clone(),
                    ..WriteOptions::default()
                },
            )
            .await
            .unwrap();
        volume.exists("a.txt", params.clone()).await.unwrap();
        volume
            .read(
                "a.txt",
                ReadOptions {
                    params: params.clone(),
                    ..ReadOptions::default()
                },
            )
            .await
            .unwrap();
        volume
            .rename(
                "a.txt",
                "b.txt",
                MoveOptions {
                    params: params.clone(),
                    ..MoveOptions::default()
                },
            )
            .await
            .unwrap();
        let listed: Vec<_> = volume.list("", params.clone()).try_collect().await.unwrap();
        assert_eq!(listed.len(), 1);
        volume.remove("b.txt", params.clone()).await.unwrap();

        let requests = client.requests();
        let operations: Vec<_> = requests.iter().map(|r| r.operation).collect();
        assert_eq!(
            operations,
            vec![
                "put_object",
                "head_object",
                "get_object",
                "copy_object",
                "delete_object",
                "list_objects",
                "delete_object",
            ]
        );
        assert!(requests.iter().all(|r| r.params == params));
        assert_eq!(
            requests[3],
            RecordedRequest {
                operation: "copy_object",
                key: "s3/b.txt".into(),
                params: params.clone(),
            }
        );
    }

    #[tokio::test]
    async fn read_and_exists_need_an_object_key() {
        let (client, volume) = volume("s3");
        for path in ["", "/", "dir/"] {
            let err = volume
                .read(path, ReadOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.code(), "ERR_MISSING_ARGUMENT", "{path:?}");
            let err = volume
                .exists(path, RequestParams::default())
                .await
                .unwrap_err();
            assert_eq!(err.code(), "ERR_MISSING_ARGUMENT", "{path:?}");
        }
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_bucket_is_translated() {
        let client = Arc::new(MemoryClient::without_bucket("gone"));
        let volume = S3Volume::with_client("", client);
        let err = volume
            .read("a.txt", ReadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_UNKNOWN_BUCKET");
        assert_eq!(err.data().bucket.as_deref(), Some("gone"));
    }

    #[test]
    fn translation_table() {
        let cases = [
            (Some(404), Some("NoSuchKey"), "ERR_FILE_NOT_FOUND"),
            (Some(404), None, "ERR_FILE_NOT_FOUND"),
            (Some(404), Some("NoSuchBucket"), "ERR_UNKNOWN_BUCKET"),
            (Some(403), Some("AllAccessDisabled"), "ERR_PERMISSION_REQUIRED"),
            (Some(403), None, "ERR_PERMISSION_REQUIRED"),
            (Some(500), Some("InternalError"), "ERR_UNKNOWN"),
            (None, None, "ERR_UNKNOWN"),
        ];
        for (status, code, expected) in cases {
            let err = translate(ClientError::new(status, code, "boom"), "p", "b");
            assert_eq!(err.code(), expected, "{status:?} {code:?}");
        }

        let err = translate(ClientError::new(Some(500), Some("SlowDown"), "boom"), "p", "b");
        let data = err.data();
        assert_eq!(data.underlying.unwrap().code, "SlowDown");
        assert_eq!(data.bucket.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn list_pages_lazily() {
        let (client, volume) = volume("s3");
        let volume = volume.with_max_keys(2);
        for p in ["a/x.txt", "a/b/y.txt", "z.txt", "q.txt", "r.txt"] {
            volume.write(p, p.into(), WriteOptions::default()).await.unwrap();
        }

        let mut listing = volume.list("", RequestParams::default());
        assert_eq!(client.list_requests(), 0);
        listing.next().await.unwrap().unwrap();
        assert_eq!(client.list_requests(), 1);
        listing.next().await.unwrap().unwrap();
        assert_eq!(client.list_requests(), 1);
        listing.next().await.unwrap().unwrap();
        assert_eq!(client.list_requests(), 2);
        drop(listing);

        assert_eq!(
            paths(&volume, "").await,
            set(&["a/b/y.txt", "a/x.txt", "q.txt", "r.txt", "z.txt"])
        );
        assert_eq!(paths(&volume, "a/").await, set(&["a/x.txt", "a/b/y.txt"]));
    }

    #[tokio::test]
    async fn list_skips_folder_markers() {
        let (client, volume) = volume("s3");
        client
            .put_object("s3/folder/", Bytes::new(), None, &RequestParams::default())
            .await
            .unwrap();
        volume
            .write("folder/file.txt", "f".into(), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(paths(&volume, "").await, set(&["folder/file.txt"]));
    }
}
