//! Object store seam
//!
//! [`ObjectStore`] exposes exactly the five calls an upload session makes.
//! [`S3ObjectStore`] backs it with [`S3Client`] and folds S3's error surface
//! into [`StoreError`].

use super::{CompletedPart, StoreError};
use crate::metrics;
use crate::s3::{S3Client, S3ClientError, S3CompletedPart};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Instant;

/// Object store operations used by an upload session
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a multipart upload for `key`, returning its upload id
    async fn initiate(&self, key: &str) -> Result<String, StoreError>;

    /// Store one part, returning its ETag
    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, StoreError>;

    /// Assemble the object from the given parts, in order
    async fn complete_upload(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError>;

    /// Discard a multipart upload and its parts
    async fn abort_upload(&self, upload_id: &str, key: &str) -> Result<(), StoreError>;

    /// Write `body` as the whole object in one call
    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), StoreError>;
}

impl From<S3ClientError> for StoreError {
    fn from(e: S3ClientError) -> Self {
        if e.is_entity_too_small() {
            StoreError::TooSmall(e.to_string())
        } else {
            StoreError::Other(e.to_string())
        }
    }
}

/// [`ObjectStore`] backed by the S3 REST API
pub struct S3ObjectStore {
    client: S3Client,
    content_type: Option<String>,
}

impl S3ObjectStore {
    pub fn new(client: S3Client) -> Self {
        Self {
            client,
            content_type: None,
        }
    }

    /// Content type sent with whole-object writes
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }
}

/// Time a store call and record it under `operation`
async fn timed<T, F>(operation: &'static str, call: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, S3ClientError>>,
{
    let start = Instant::now();
    let result = call.await.map_err(StoreError::from);
    metrics::record_store_call(operation, result.is_ok(), start.elapsed().as_secs_f64());
    result
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn initiate(&self, key: &str) -> Result<String, StoreError> {
        timed("create_multipart_upload", self.client.create_multipart_upload(key))
            .await
            .map(|r| r.upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, StoreError> {
        timed(
            "upload_part",
            self.client.upload_part(key, upload_id, part_number, body),
        )
        .await
        .map(|r| r.etag)
    }

    async fn complete_upload(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        let parts: Vec<S3CompletedPart> = parts
            .iter()
            .map(|p| S3CompletedPart {
                part_number: p.part_number,
                etag: p.etag.clone(),
            })
            .collect();
        timed(
            "complete_multipart_upload",
            self.client.complete_multipart_upload(key, upload_id, &parts),
        )
        .await
        .map(|_| ())
    }

    async fn abort_upload(&self, upload_id: &str, key: &str) -> Result<(), StoreError> {
        timed(
            "abort_multipart_upload",
            self.client.abort_multipart_upload(key, upload_id),
        )
        .await
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), StoreError> {
        timed(
            "put_object",
            self.client
                .put_object(key, body, self.content_type.as_deref()),
        )
        .await
        .map(|_| ())
    }
}
