//! Shared test fixtures
//!
//! [`RecordingStore`] is an in-memory [`ObjectStore`] that records every call
//! in order and can be told to fail specific operations.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;
use stream_uploadr::upload::{CompletedPart, ObjectStore, StoreError};

pub const UPLOAD_ID: &str = "upload-1";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initiate {
        key: String,
    },
    UploadPart {
        upload_id: String,
        key: String,
        part_number: u32,
        body: Bytes,
    },
    Complete {
        upload_id: String,
        key: String,
        parts: Vec<CompletedPart>,
    },
    Abort {
        upload_id: String,
        key: String,
    },
    PutObject {
        key: String,
        body: Bytes,
    },
}

#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<Call>>,
    fail_initiate: Option<StoreError>,
    fail_part: Option<(u32, StoreError)>,
    fail_complete: Option<StoreError>,
    fail_abort: bool,
    fail_put: Option<StoreError>,
    delay: Option<Duration>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_initiate(mut self, err: StoreError) -> Self {
        self.fail_initiate = Some(err);
        self
    }

    pub fn failing_part(mut self, part_number: u32, err: StoreError) -> Self {
        self.fail_part = Some((part_number, err));
        self
    }

    pub fn failing_complete(mut self, err: StoreError) -> Self {
        self.fail_complete = Some(err);
        self
    }

    pub fn failing_abort(mut self) -> Self {
        self.fail_abort = true;
        self
    }

    pub fn failing_put(mut self, err: StoreError) -> Self {
        self.fail_put = Some(err);
        self
    }

    /// Slow every call down, to exercise back-pressure
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Successfully uploaded parts as (part number, payload)
    pub fn uploaded_parts(&self) -> Vec<(u32, Bytes)> {
        let failed = self.fail_part.as_ref().map(|(n, _)| *n);
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UploadPart {
                    part_number, body, ..
                } if Some(part_number) != failed => Some((part_number, body)),
                _ => None,
            })
            .collect()
    }

    pub fn complete_calls(&self) -> Vec<Vec<CompletedPart>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Complete { parts, .. } => Some(parts),
                _ => None,
            })
            .collect()
    }

    pub fn put_calls(&self) -> Vec<Bytes> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::PutObject { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn abort_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Abort { upload_id, .. } => Some(upload_id),
                _ => None,
            })
            .collect()
    }

    /// The object as the store would hold it, if a write succeeded
    pub fn stored_object(&self) -> Option<Bytes> {
        if self.fail_put.is_none() {
            if let Some(body) = self.put_calls().pop() {
                return Some(body);
            }
        }
        if self.fail_complete.is_some() {
            return None;
        }
        let parts = self.complete_calls().pop()?;
        let uploaded = self.uploaded_parts();
        let mut object = BytesMut::new();
        for part in parts {
            let (_, body) = uploaded.iter().find(|(n, _)| *n == part.part_number)?;
            object.extend_from_slice(body);
        }
        Some(object.freeze())
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn initiate(&self, key: &str) -> Result<String, StoreError> {
        self.pause().await;
        self.record(Call::Initiate { key: key.into() });
        match &self.fail_initiate {
            Some(err) => Err(err.clone()),
            None => Ok(UPLOAD_ID.to_string()),
        }
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, StoreError> {
        self.pause().await;
        self.record(Call::UploadPart {
            upload_id: upload_id.into(),
            key: key.into(),
            part_number,
            body,
        });
        match &self.fail_part {
            Some((n, err)) if *n == part_number => Err(err.clone()),
            _ => Ok(format!("\"etag-{}\"", part_number)),
        }
    }

    async fn complete_upload(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        self.pause().await;
        self.record(Call::Complete {
            upload_id: upload_id.into(),
            key: key.into(),
            parts: parts.to_vec(),
        });
        match &self.fail_complete {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn abort_upload(&self, upload_id: &str, key: &str) -> Result<(), StoreError> {
        self.pause().await;
        self.record(Call::Abort {
            upload_id: upload_id.into(),
            key: key.into(),
        });
        if self.fail_abort {
            Err(StoreError::Other("NoSuchUpload".into()))
        } else {
            Ok(())
        }
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<(), StoreError> {
        self.pause().await;
        self.record(Call::PutObject {
            key: key.into(),
            body,
        });
        match &self.fail_put {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Random payload of `len` bytes
pub fn random_bytes(len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    Bytes::from(data)
}

/// Split `data` into chunks of the given sizes, then the remainder
pub fn chunked(data: &Bytes, sizes: &[usize]) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    for &size in sizes {
        let end = (offset + size).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    if offset < data.len() {
        chunks.push(data.slice(offset..));
    }
    chunks
}
