use std::borrow::Cow;

use ::s3::bucket::Bucket;
use ::s3::creds::Credentials;
use ::s3::error::S3Error;
use ::s3::region::Region;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::debug;

use super::{ClientError, ClientOptions, ClientResult, ObjectClient, ObjectInfo, ObjectLocation, ObjectPage};
use crate::entry::RequestParams;
use crate::error::{Error, Result, Underlying};

/// [`ObjectClient`] over a rust-s3 [`Bucket`].
pub struct BucketClient {
    name: String,
    bucket: Box<Bucket>,
}

impl BucketClient {
    pub fn connect(bucket_name: &str, options: &ClientOptions) -> Result<Self> {
        let config_error = |message: String| Error::Unknown {
            path: String::new(),
            bucket: Some(bucket_name.to_string()),
            underlying: Underlying::new("ClientConfig", message),
        };

        let region = match &options.endpoint {
            Some(endpoint) => Region::Custom {
                region: options.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => options
                .region
                .parse::<Region>()
                .map_err(|e| config_error(format!("invalid region {}: {e}", options.region)))?,
        };
        let credentials = match &options.credentials {
            Some(creds) => Credentials::new(
                Some(&creds.access_key),
                Some(&creds.secret_key),
                None,
                None,
                None,
            ),
            None => Credentials::anonymous(),
        }
        .map_err(|e| config_error(e.to_string()))?;

        let mut bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| config_error(e.to_string()))?;
        if options.path_style {
            bucket = bucket.with_path_style();
        }
        debug!(bucket = bucket_name, path_style = options.path_style, "connected S3 client");
        Ok(Self {
            name: bucket_name.to_string(),
            bucket,
        })
    }

    /// The bucket handle for one request. Extra headers and query pairs are
    /// applied to a clone so they never leak into later requests.
    fn bucket_for(&self, params: &RequestParams) -> ClientResult<Cow<'_, Bucket>> {
        if params.is_empty() {
            return Ok(Cow::Borrowed(&*self.bucket));
        }
        let mut bucket = (*self.bucket).clone();
        for (name, value) in &params.headers {
            if !valid_header_name(name) || !valid_header_value(value) {
                return Err(ClientError::new(
                    None,
                    Some("InvalidHeader"),
                    format!("invalid request header {name:?}"),
                ));
            }
            bucket.add_header(name, value);
        }
        for (key, value) in &params.query {
            bucket.add_query(key, value);
        }
        Ok(Cow::Owned(bucket))
    }

    fn info(key: &str, status: u16) -> ClientResult<ObjectInfo> {
        if status >= 300 {
            return Err(ClientError::new(Some(status), None, format!("unexpected status for {key}")));
        }
        Ok(ObjectInfo {
            key: key.to_string(),
            status,
            ..ObjectInfo::default()
        })
    }
}

#[async_trait]
impl ObjectClient for BucketClient {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo> {
        let bucket = self.bucket_for(params)?;
        let response = match content_type {
            Some(content_type) => {
                bucket
                    .put_object_with_content_type(key, &body, content_type)
                    .await
            }
            None => bucket.put_object(key, &body).await,
        }
        .map_err(client_error)?;

        let mut info = Self::info(key, response.status_code())?;
        info.e_tag = response.headers().get("etag").cloned();
        info.size = Some(body.len() as u64);
        info.content_type = content_type.map(str::to_string);
        Ok(info)
    }

    async fn put_object_stream(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        content_type: Option<&str>,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo> {
        let bucket = self.bucket_for(params)?;
        let mut reader = reader;
        let response = match content_type {
            Some(content_type) => {
                bucket
                    .put_object_stream_with_content_type(&mut reader, key, content_type)
                    .await
            }
            None => bucket.put_object_stream(&mut reader, key).await,
        }
        .map_err(client_error)?;

        let mut info = Self::info(key, response.status_code())?;
        info.size = Some(response.uploaded_bytes() as u64);
        info.content_type = content_type.map(str::to_string);
        Ok(info)
    }

    async fn head_object(&self, key: &str, params: &RequestParams) -> ClientResult<ObjectInfo> {
        let bucket = self.bucket_for(params)?;
        let (head, status) = bucket.head_object(key).await.map_err(client_error)?;
        let mut info = Self::info(key, status)?;
        info.e_tag = head.e_tag;
        info.size = head.content_length.map(|len| len as u64);
        info.last_modified = head.last_modified;
        info.content_type = head.content_type;
        Ok(info)
    }

    async fn get_object(
        &self,
        key: &str,
        params: &RequestParams,
    ) -> ClientResult<(Bytes, ObjectInfo)> {
        let bucket = self.bucket_for(params)?;
        let response = bucket.get_object(key).await.map_err(client_error)?;
        let mut info = Self::info(key, response.status_code())?;
        let headers = response.headers();
        info.e_tag = headers.get("etag").cloned();
        info.last_modified = headers.get("last-modified").cloned();
        info.content_type = headers.get("content-type").cloned();

        let body = Bytes::from(response.to_vec());
        info.size = Some(body.len() as u64);
        Ok((body, info))
    }

    async fn copy_object(
        &self,
        source: &ObjectLocation,
        key: &str,
        params: &RequestParams,
    ) -> ClientResult<ObjectInfo> {
        if source.bucket != self.name {
            return Err(ClientError::new(
                None,
                Some("CrossBucketCopy"),
                format!("cannot copy {source} into bucket {}", self.name),
            ));
        }
        let status = self
            .bucket_for(params)?
            .copy_object_internal(&source.key, key)
            .await
            .map_err(client_error)?;
        Self::info(key, status)
    }

    async fn delete_object(&self, key: &str, params: &RequestParams) -> ClientResult<ObjectInfo> {
        let bucket = self.bucket_for(params)?;
        let response = bucket.delete_object(key).await.map_err(client_error)?;
        Self::info(key, response.status_code())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: usize,
        params: &RequestParams,
    ) -> ClientResult<ObjectPage> {
        let (result, status) = self
            .bucket_for(params)?
            .list_page(
                prefix.to_string(),
                None,
                continuation_token,
                None,
                Some(max_keys),
            )
            .await
            .map_err(client_error)?;
        Self::info(prefix, status)?;

        let objects = result
            .contents
            .into_iter()
            .map(|object| ObjectInfo {
                key: object.key,
                status,
                e_tag: object.e_tag,
                size: Some(object.size),
                last_modified: Some(object.last_modified),
                content_type: None,
            })
            .collect();
        let next_token = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };
        Ok(ObjectPage {
            objects,
            next_token,
        })
    }
}

fn client_error(err: S3Error) -> ClientError {
    match err {
        S3Error::HttpFailWithBody(status, body) => {
            let code = xml_field(&body, "Code");
            let message = xml_field(&body, "Message").unwrap_or(body);
            ClientError::new(Some(status), code.as_deref(), message)
        }
        other => ClientError::new(None, None, other.to_string()),
    }
}

/// RFC 9110 token characters.
fn valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn valid_header_value(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || (b' '..=b'~').contains(&b))
}

/// Pulls `<tag>value</tag>` out of an S3 XML error document.
fn xml_field(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StaticCredentials;

    const NO_SUCH_KEY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message><Key>s3/a.txt</Key></Error>"#;

    #[test]
    fn parses_error_documents() {
        assert_eq!(xml_field(NO_SUCH_KEY, "Code").as_deref(), Some("NoSuchKey"));
        assert_eq!(
            xml_field(NO_SUCH_KEY, "Message").as_deref(),
            Some("The specified key does not exist.")
        );
        assert_eq!(xml_field("not xml", "Code"), None);
    }

    #[test]
    fn http_failures_keep_status_and_code() {
        let err = client_error(S3Error::HttpFailWithBody(404, NO_SUCH_KEY.to_string()));
        assert_eq!(err.status, Some(404));
        assert_eq!(err.code.as_deref(), Some("NoSuchKey"));
        assert!(err.is_missing());

        let err = client_error(S3Error::HttpFailWithBody(404, String::new()));
        assert_eq!(err.code, None);
        assert!(err.is_missing());
    }

    fn local_options() -> ClientOptions {
        ClientOptions {
            region: "us-east-1".into(),
            endpoint: Some("http://localhost:9000".into()),
            credentials: Some(StaticCredentials {
                access_key: "minio".into(),
                secret_key: "minio123".into(),
            }),
            path_style: true,
        }
    }

    #[test]
    fn connects_with_custom_endpoint() {
        let client = BucketClient::connect("uploads", &local_options()).unwrap();
        assert_eq!(client.bucket(), "uploads");
    }

    #[test]
    fn request_params_extend_a_copy_of_the_bucket() {
        let client = BucketClient::connect("uploads", &local_options()).unwrap();
        let params = RequestParams::default()
            .with_header("x-amz-meta-owner", "ops")
            .with_query("versionId", "3");

        let bucket = client.bucket_for(&params).unwrap();
        assert_eq!(
            bucket
                .extra_headers()
                .get("x-amz-meta-owner")
                .and_then(|v| v.to_str().ok()),
            Some("ops")
        );
        assert_eq!(bucket.extra_query().get("versionId").map(String::as_str), Some("3"));
        assert!(client.bucket.extra_headers().is_empty());

        let plain = client.bucket_for(&RequestParams::default()).unwrap();
        assert!(matches!(plain, Cow::Borrowed(_)));
    }

    #[test]
    fn invalid_headers_are_refused() {
        let client = BucketClient::connect("uploads", &local_options()).unwrap();
        for params in [
            RequestParams::default().with_header("bad name", "v"),
            RequestParams::default().with_header("", "v"),
            RequestParams::default().with_header("x-ok", "line\nbreak"),
        ] {
            let err = client.bucket_for(&params).unwrap_err();
            assert_eq!(err.code.as_deref(), Some("InvalidHeader"));
        }
    }
}
