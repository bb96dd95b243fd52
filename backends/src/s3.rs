use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::fmt::Display;
use std::io;
use tidesnap_core::{Backend, BackendType, Error, ObjectInfo, Result};

pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Backend {
    /// Connects with credentials and region from the standard AWS environment.
    pub async fn new(bucket: String, prefix: String) -> Result<Self> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Ok(Self {
            client: Client::new(&sdk_config),
            bucket,
            prefix,
        })
    }

    fn full_key(&self, path: &str) -> String {
        match self.prefix.as_str() {
            "" => path.to_string(),
            prefix => format!("{prefix}/{path}"),
        }
    }

    /// Fetches a whole object, or the inclusive byte `range` of it.
    async fn get(&self, path: &str, range: Option<String>) -> Result<Bytes> {
        let ranged = range.is_some();
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .set_range(range)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if let Some(outcome) = e.as_service_error().and_then(|se| get_failure(path, ranged, se)) {
                    return outcome;
                }
                return Err(unavailable(path, e));
            }
        };

        let body = response.body.collect().await.map_err(|e| unavailable(path, e))?;
        Ok(body.into_bytes())
    }
}

fn unavailable(path: &str, err: impl Display) -> Error {
    Error::backend(path, io::Error::other(err.to_string()))
}

fn missing(path: &str) -> Error {
    Error::backend(path, io::Error::new(io::ErrorKind::NotFound, "no such key"))
}

/// Service errors with a definite answer. A range starting at or past the end of the
/// object (HTTP 416) reads as empty, like a short read on the other backends.
fn get_failure(path: &str, ranged: bool, err: &GetObjectError) -> Option<Result<Bytes>> {
    if err.is_no_such_key() {
        return Some(Err(missing(path)));
    }
    if ranged && err.code() == Some("InvalidRange") {
        return Some(Ok(Bytes::new()));
    }
    None
}

/// HTTP `Range` header value for `length` bytes starting at `offset`, or `None`
/// when the range cannot be addressed.
fn range_header(offset: u64, length: u64) -> Option<String> {
    let last = offset.checked_add(length.checked_sub(1)?)?;
    Some(format!("bytes={}-{}", offset, last))
}

#[async_trait]
impl Backend for S3Backend {
    async fn init(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| unavailable(&self.bucket, e))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(unavailable(path, e)),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.get(path, None).await
    }

    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        match range_header(offset, length) {
            Some(range) => self.get(path, Some(range)).await,
            None => Ok(Bytes::new()),
        }
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| unavailable(path, e))?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| unavailable(path, e))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = format!("{}/", self.full_key(prefix.trim_end_matches('/')));
        let root = match self.prefix.as_str() {
            "" => String::new(),
            p => format!("{p}/"),
        };

        let mut names = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&dir)
            .delimiter("/")
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| unavailable(prefix, e))?;
            for key in page.contents().iter().filter_map(|object| object.key()) {
                names.push(key.strip_prefix(root.as_str()).unwrap_or(key).to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_not_found() => missing(path),
                _ => unavailable(path, e),
            })?;

        let modified = head
            .last_modified()
            .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
            .unwrap_or_else(chrono::Utc::now);

        Ok(ObjectInfo {
            path: path.to_string(),
            size: head.content_length().unwrap_or(0).max(0) as u64,
            modified,
        })
    }

    fn backend_type(&self) -> BackendType {
        BackendType::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::types::error::NoSuchKey;

    #[test]
    fn range_header_is_inclusive() {
        assert_eq!(range_header(0, 1).as_deref(), Some("bytes=0-0"));
        assert_eq!(range_header(100, 50).as_deref(), Some("bytes=100-149"));
    }

    #[test]
    fn unaddressable_ranges_have_no_header() {
        assert_eq!(range_header(7, 0), None);
        assert_eq!(range_header(u64::MAX - 2, 10), None);
        assert_eq!(range_header(u64::MAX, 1).as_deref(), Some("bytes=18446744073709551615-18446744073709551615"));
    }

    #[test]
    fn unsatisfiable_range_reads_as_empty() {
        let err = GetObjectError::generic(ErrorMetadata::builder().code("InvalidRange").build());

        let outcome = get_failure("data/p.pack", true, &err).unwrap();
        assert!(outcome.unwrap().is_empty());
        assert!(get_failure("data/p.pack", false, &err).is_none());
    }

    #[test]
    fn missing_key_is_final_and_other_errors_are_not_classified() {
        let err = GetObjectError::NoSuchKey(NoSuchKey::builder().build());
        let outcome = get_failure("snapshots/a", false, &err).unwrap();
        assert!(outcome.unwrap_err().is_missing_object());

        let throttled = GetObjectError::generic(ErrorMetadata::builder().code("SlowDown").build());
        assert!(get_failure("snapshots/a", true, &throttled).is_none());
    }
}
