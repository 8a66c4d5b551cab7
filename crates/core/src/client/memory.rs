use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

use super::{ClientError, ClientResult, ObjectClient, ObjectInfo, ObjectLocation, ObjectPage};
use crate::entry::RequestParams;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    e_tag: String,
    last_modified: String,
    content_type: Option<String>,
}

impl StoredObject {
    fn info(&self, key: &str, status: u16) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            status,
            e_tag: Some(self.e_tag.clone()),
            size: Some(self.body.len() as u64),
            last_modified: Some(self.last_modified.clone()),
            content_type: self.content_type.clone(),
        }
    }
}

/// One call received by a [`MemoryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub operation: &'static str,
    pub key: String,
    pub params: RequestParams,
}

/// In-process bucket that answers like S3: 404 `NoSuchKey` for missing keys,
/// silent success when deleting them, and continuation-token paging.
#[derive(Debug)]
pub struct MemoryClient {
    bucket: String,
    bucket_exists: bool,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    deny_deletes: AtomicBool,
    list_requests: AtomicUsize,
    requests: StdMutex<Vec<RecordedRequest>>,
}

impl MemoryClient {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            bucket_exists: true,
            objects: Mutex::new(BTreeMap::new()),
            deny_deletes: AtomicBool::new(false),
            list_requests: AtomicUsize::new(0),
            requests: StdMutex::new(Vec::new()),
        }
    }

    /// A client whose bucket does not exist; every call fails with
    /// `NoSuchBucket`.
    pub fn without_bucket(bucket: &str) -> Self {
        Self {
            bucket_exists: false,
            ..Self::new(bucket)
        }
    }

    /// Makes every delete fail with `AccessDenied`.
    pub fn deny_deletes(&self, deny: bool) {
        self.deny_deletes.store(deny, Ordering::SeqCst);
    }

    /// Number of list requests served so far.
    pub fn list_requests(&self) -> usize {
        self.list_requests.load(Ordering::SeqCst)
    }

    /// Every request served so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, operation: &'static str, key: &str, params: &RequestParams) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                operation,
                key: key.to_string(),
                params: params.clone(),
            });
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    fn check_bucket(&self) -> ClientResult<()> {
        if self.bucket_exists {
            Ok(())
        } else {
            Err(ClientError::new(
                Some(404),
                Some("NoSuchBucket"),
                format!("The specified bucket does not exist: {}", self.bucket),
            ))
        }
    }

    async fn store(&self, key: &str, body: Bytes, content_type: Option<&str>) -> ObjectInfo {
        let object = StoredObject {
            body,
            e_tag: format!("\"{}\"", uuid::Uuid::new_v4().simple()),
            last_modified: Utc::now().to_rfc3339(),
            content_type: content_type.map(str::to_string),
        };
        let info = object.info(key, 200);
        self.objects.lock().await.insert(key.to_string(), object);
        info
    }
}

fn no_such_key(key: &str) -> ClientError {
    ClientError::new(
        Some(404),
        Some("NoSuchKey"),
        format!("The specified key does not exist: {key}"),
    )
}

#[async_trait]
impl ObjectClient for MemoryClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo> {
        self.record("put_object", key, params);
        self.check_bucket()?;
        Ok(self.store(key, body, content_type).await)
    }

    async fn put_object_stream(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        content_type: Option<&str>,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo> {
        self.record("put_object_stream", key, params);
        self.check_bucket()?;
        let mut reader = reader;
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| ClientError::new(None, Some("RequestBodyRead"), e.to_string()))?;
        Ok(self.store(key, Bytes::from(body), content_type).await)
    }

    async fn head_object(&self, key: &str, params: &RequestParams) -> ClientResult<ObjectInfo> {
        self.record("head_object", key, params);
        self.check_bucket()?;
        let objects = self.objects.lock().await;
        match objects.get(key) {
            Some(object) => Ok(object.info(key, 200)),
            // HEAD responses carry no error document.
            None => Err(ClientError::new(Some(404), None, "Not Found")),
        }
    }

    async fn get_object(
        &self,
        key: &str,
        params: &RequestParams,
    ) -> ClientResult<(Bytes, ObjectInfo)> {
        self.record("get_object", key, params);
        self.check_bucket()?;
        let objects = self.objects.lock().await;
        let object = objects.get(key).ok_or_else(|| no_such_key(key))?;
        Ok((object.body.clone(), object.info(key, 200)))
    }

    async fn copy_object(
        &self,
        source: &ObjectLocation,
        key: &str,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo> {
        self.record("copy_object", key, params);
        self.check_bucket()?;
        if source.bucket != self.bucket {
            return Err(ClientError::new(
                Some(404),
                Some("NoSuchBucket"),
                format!("The specified bucket does not exist: {}", source.bucket),
            ));
        }
        let mut objects = self.objects.lock().await;
        let mut object = objects
            .get(&source.key)
            .cloned()
            .ok_or_else(|| no_such_key(&source.key))?;
        object.last_modified = Utc::now().to_rfc3339();
        let info = object.info(key, 200);
        objects.insert(key.to_string(), object);
        Ok(info)
    }

    async fn delete_object(&self, key: &str, params: &RequestParams) -> ClientResult<ObjectInfo> {
        self.record("delete_object", key, params);
        self.check_bucket()?;
        if self.deny_deletes.load(Ordering::SeqCst) {
            return Err(ClientError::new(Some(403), Some("AccessDenied"), "Access Denied"));
        }
        self.objects.lock().await.remove(key);
        Ok(ObjectInfo {
            key: key.to_string(),
            status: 204,
            ..ObjectInfo::default()
        })
    }

    async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: usize,
        params: &RequestParams,
    ) -> ClientResult<ObjectPage> {
        self.record("list_objects", prefix, params);
        self.check_bucket()?;
        self.list_requests.fetch_add(1, Ordering::SeqCst);

        let objects = self.objects.lock().await;
        let lower = match &continuation_token {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Included(prefix.to_string()),
        };
        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix));

        let page: Vec<ObjectInfo> = matching
            .by_ref()
            .take(max_keys.max(1))
            .map(|(key, object)| object.info(key, 200))
            .collect();
        let next_token = match matching.next() {
            Some(_) => page.last().map(|info| info.key.clone()),
            None => None,
        };
        Ok(ObjectPage {
            objects: page,
            next_token,
        })
    }
}
