//! Blob storage for downloadable state files.

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::io::ReaderStream;

/// Object body as a byte stream.
pub type BlobStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A fetched object.
pub struct Blob {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub body: BlobStream,
}

/// Read-only object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch object `name`; `NotFound` when absent.
    async fn get(&self, name: &str) -> Result<Blob>;
}

/// Reject names that could address anything outside the configured prefix.
pub fn validate_name(name: &str) -> Result<&str> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '"'])
        && !name.chars().any(char::is_control);
    if ok {
        Ok(name)
    } else {
        Err(ServerError::not_found(format!("state file '{name}'")))
    }
}

/// S3 bucket (optionally under a key prefix).
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3BlobStore {
    /// Build a client from the standard AWS environment (region, credentials).
    pub async fn from_env(bucket: impl Into<String>, prefix: Option<String>) -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&sdk_config), bucket, prefix)
    }

    pub fn new(client: Client, bucket: impl Into<String>, prefix: Option<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn key(&self, name: &str) -> String {
        object_key(self.prefix.as_deref(), name)
    }
}

fn object_key(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}/{name}"),
        None => name.to_string(),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, name: &str) -> Result<Blob> {
        let key = self.key(validate_name(name)?);

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| map_s3_error(e, &key))?;

        Ok(Blob {
            content_length: output
                .content_length()
                .and_then(|n| u64::try_from(n).ok()),
            content_type: output.content_type().map(str::to_string),
            body: ReaderStream::new(output.body.into_async_read()).boxed(),
        })
    }
}

/// Map an SDK error, treating HTTP 404 as NotFound
fn map_s3_error<E: std::fmt::Debug>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> ServerError {
    use aws_sdk_s3::error::SdkError;

    match &err {
        SdkError::ServiceError(service_err) => match service_err.raw().status().as_u16() {
            404 => ServerError::not_found(format!("Key not found: {key}")),
            status => ServerError::Storage(format!("S3 error for key '{key}' (HTTP {status})")),
        },
        SdkError::TimeoutError(_) => ServerError::Storage(format!("S3 timeout for key '{key}'")),
        SdkError::DispatchFailure(_) => {
            ServerError::Storage(format!("S3 connection error for key '{key}': {err:?}"))
        }
        _ => ServerError::Storage(format!("S3 error for key '{key}': {err:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("nsi_2022_06.gpkg.zip").is_ok());
        for bad in ["", ".", "..", "../secrets", "a/b", "a\\b", "x\ny", "a\"b"] {
            assert!(validate_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key(Some("v2"), "ak.gpkg"), "v2/ak.gpkg");
        assert_eq!(object_key(None, "ak.gpkg"), "ak.gpkg");
    }
}
