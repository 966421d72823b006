//! Upload session state machine
//!
//! One [`UploadSession`] owns the multipart upload for one destination key.
//! It cuts the incoming stream into parts of exactly `min_part_size` bytes,
//! uploads them in order, and at stream end decides between completing the
//! multipart upload, falling back to a single whole-object write, or aborting.
//!
//! ```text
//! Uninitiated --start ok--> Active --stream end--> Finalizing --> Completed
//!      |                      |                        |------> FallbackCompleted
//!      +--start err--> Failed +--part err--> Aborted   |------> Aborted
//!                                                      +------> Failed (no bytes)
//! ```
//!
//! Failed part uploads are never retried. The whole-object write is the only
//! recovery path.

use super::{
    CompletedPart, ObjectStore, PartBuffer, SessionError, SessionReport, SessionState, StoreError,
};
use crate::config::S3_MIN_PART_SIZE;
use crate::metrics;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Uploaded parts whose payloads stay referenced for the whole-object fallback.
///
/// With parts of at least [`S3_MIN_PART_SIZE`], `EntityTooSmall` can only come
/// back while the object is at most this many parts long, so later parts are
/// never retained. Sessions cutting smaller parts retain every payload.
const MAX_RETAINED_PARTS: usize = 2;

/// Multipart upload lifecycle for one destination key
pub struct UploadSession<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    destination_key: String,
    min_part_size: usize,
    upload_id: Option<String>,
    next_part_number: u32,
    completed_parts: Vec<CompletedPart>,
    buffer: PartBuffer,
    retained: Option<Vec<Bytes>>,
    retain_all: bool,
    bytes_received: u64,
    state: SessionState,
    report: Option<SessionReport>,
}

impl<S: ObjectStore + ?Sized> UploadSession<S> {
    /// Create a session; nothing touches the store until [`start`](Self::start)
    pub fn new(store: Arc<S>, destination_key: impl Into<String>, min_part_size: usize) -> Self {
        let min_part_size = min_part_size.max(1);
        Self {
            store,
            destination_key: destination_key.into(),
            min_part_size,
            upload_id: None,
            next_part_number: 1,
            completed_parts: Vec::new(),
            buffer: PartBuffer::with_capacity(min_part_size),
            retained: Some(Vec::with_capacity(MAX_RETAINED_PARTS)),
            retain_all: min_part_size < S3_MIN_PART_SIZE,
            bytes_received: 0,
            state: SessionState::Uninitiated,
            report: None,
        }
    }

    pub fn destination_key(&self) -> &str {
        &self.destination_key
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn next_part_number(&self) -> u32 {
        self.next_part_number
    }

    pub fn completed_parts(&self) -> &[CompletedPart] {
        &self.completed_parts
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Bytes waiting for the next part
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Open the multipart upload
    #[tracing::instrument(
        name = "session.start",
        skip(self),
        fields(s3.key = %self.destination_key, s3.upload_id = tracing::field::Empty),
        err
    )]
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Uninitiated {
            return Err(SessionError::InvalidState(self.state));
        }

        match self.store.initiate(&self.destination_key).await {
            Ok(upload_id) => {
                tracing::Span::current().record("s3.upload_id", upload_id.as_str());
                info!(upload_id = %upload_id, "Multipart upload started");
                self.upload_id = Some(upload_id);
                self.state = SessionState::Active;
                Ok(())
            }
            Err(e) => {
                let err = SessionError::Initiation(e);
                self.finish(SessionState::Failed, Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Accept one chunk, uploading every full part it completes
    ///
    /// Rejected without side effects unless the session is `Active`. A failed
    /// part upload aborts the multipart upload and ends the session.
    pub async fn ingest(&mut self, chunk: Bytes) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            warn!(
                s3.key = %self.destination_key,
                state = self.state.as_str(),
                bytes = chunk.len(),
                "Rejecting chunk for inactive session"
            );
            return Err(SessionError::InvalidState(self.state));
        }
        if chunk.is_empty() {
            return Ok(());
        }

        self.bytes_received += chunk.len() as u64;
        metrics::record_chunk(chunk.len());
        self.buffer.append(&chunk);

        while let Some(part) = self.buffer.take_part(self.min_part_size) {
            if let Err(source) = self.upload_part(part).await {
                let err = SessionError::PartUpload {
                    part_number: self.next_part_number,
                    source,
                };
                error!(s3.key = %self.destination_key, error = %err, "Aborting multipart upload");
                self.abort_upload_quietly().await;
                self.finish(SessionState::Aborted, Some(err.clone()));
                return Err(err);
            }
        }

        Ok(())
    }

    /// End the stream and settle the upload. Idempotent.
    #[tracing::instrument(
        name = "session.finalize",
        skip(self),
        fields(
            s3.key = %self.destination_key,
            parts_count = self.completed_parts.len(),
            upload.bytes = self.bytes_received
        )
    )]
    pub async fn finalize(&mut self) -> SessionReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        if self.state != SessionState::Active {
            // start() never ran
            let state = self.state;
            return self.finish(SessionState::Failed, Some(SessionError::InvalidState(state)));
        }

        self.state = SessionState::Finalizing;

        if self.completed_parts.is_empty() {
            return self.finalize_without_parts().await;
        }

        let mut unsent_tail = None;
        if !self.buffer.is_empty() {
            let tail = self.buffer.take_and_reset();
            if let Err(e) = self.upload_part(tail.clone()).await {
                warn!(
                    error = %e,
                    bytes = tail.len(),
                    "Final part upload failed, completing with the parts already stored"
                );
                unsent_tail = Some(tail);
            }
        }

        let Some(upload_id) = self.upload_id.clone() else {
            error!("Parts were uploaded without a multipart upload id");
            return self.finish(
                SessionState::Aborted,
                Some(SessionError::Completion(StoreError::Other(
                    "no multipart upload in progress".into(),
                ))),
            );
        };
        let result = self
            .store
            .complete_upload(&upload_id, &self.destination_key, &self.completed_parts)
            .await;

        match result {
            Ok(()) => {
                info!(parts = self.completed_parts.len(), "Multipart upload completed");
                self.finish(SessionState::Completed, None)
            }
            Err(StoreError::TooSmall(message)) => {
                warn!(%message, "Object too small for multipart, falling back to a single write");
                self.abort_upload_quietly().await;
                match self.fallback_payload(unsent_tail) {
                    Some(payload) => self.write_whole_object(payload).await,
                    None => self.finish(
                        SessionState::Aborted,
                        Some(SessionError::FallbackWrite(
                            "stream bytes are no longer retained".into(),
                        )),
                    ),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to complete multipart upload");
                self.abort_upload_quietly().await;
                self.finish(SessionState::Aborted, Some(SessionError::Completion(e)))
            }
        }
    }

    /// Abort the multipart upload and end the session. Never fails.
    pub async fn abort(&mut self) -> SessionReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        self.abort_upload_quietly().await;
        self.finish(SessionState::Aborted, None)
    }

    /// No part ever reached the threshold: everything is still buffered.
    async fn finalize_without_parts(&mut self) -> SessionReport {
        let payload = self.buffer.take_and_reset();
        self.abort_upload_quietly().await;

        if payload.is_empty() {
            info!("Stream ended without data, nothing written");
            return self.finish(SessionState::Failed, Some(SessionError::EmptyStream));
        }

        self.write_whole_object(payload).await
    }

    async fn write_whole_object(&mut self, payload: Bytes) -> SessionReport {
        let size = payload.len();
        match self.store.put_object(&self.destination_key, payload).await {
            Ok(()) => {
                metrics::record_fallback_write(true);
                info!(bytes = size, "Whole-object write completed");
                self.upload_id = None;
                self.finish(SessionState::FallbackCompleted, None)
            }
            Err(e) => {
                metrics::record_fallback_write(false);
                error!(error = %e, bytes = size, "Whole-object write failed");
                self.finish(
                    SessionState::Aborted,
                    Some(SessionError::FallbackWrite(e.to_string())),
                )
            }
        }
    }

    async fn upload_part(&mut self, payload: Bytes) -> Result<(), StoreError> {
        let Some(upload_id) = self.upload_id.as_deref() else {
            return Err(StoreError::Other("no multipart upload in progress".into()));
        };
        let part_number = self.next_part_number;
        let size = payload.len();

        let result = self
            .store
            .upload_part(upload_id, &self.destination_key, part_number, payload.clone())
            .await;

        match result {
            Ok(etag) => {
                debug!(part_number, bytes = size, etag = %etag, "Uploaded part");
                self.completed_parts.push(CompletedPart { part_number, etag });
                self.next_part_number += 1;
                self.retain(payload);
                metrics::record_part(true, size);
                Ok(())
            }
            Err(e) => {
                metrics::record_part(false, size);
                Err(e)
            }
        }
    }

    fn retain(&mut self, payload: Bytes) {
        if let Some(retained) = self.retained.as_mut() {
            if self.retain_all || retained.len() < MAX_RETAINED_PARTS {
                retained.push(payload);
            } else {
                self.retained = None;
            }
        }
    }

    /// The full stream, if every received byte is still referenced
    fn fallback_payload(&mut self, unsent_tail: Option<Bytes>) -> Option<Bytes> {
        let mut pieces = self.retained.take()?;
        pieces.extend(unsent_tail);

        let total: usize = pieces.iter().map(Bytes::len).sum();
        if total as u64 != self.bytes_received {
            return None;
        }
        if pieces.len() == 1 {
            return pieces.pop();
        }

        let mut whole = BytesMut::with_capacity(total);
        for piece in &pieces {
            whole.extend_from_slice(piece);
        }
        Some(whole.freeze())
    }

    /// Best-effort cleanup; failures are logged and swallowed.
    async fn abort_upload_quietly(&self) {
        let Some(upload_id) = self.upload_id.as_deref() else {
            return;
        };
        match self.store.abort_upload(upload_id, &self.destination_key).await {
            Ok(()) => {
                metrics::record_abort(true);
                info!(upload_id = %upload_id, "Multipart upload aborted");
            }
            Err(e) => {
                metrics::record_abort(false);
                warn!(upload_id = %upload_id, error = %e, "Failed to abort multipart upload");
            }
        }
    }

    fn finish(&mut self, state: SessionState, error: Option<SessionError>) -> SessionReport {
        self.state = state;
        self.retained = None;
        self.buffer.take_and_reset();
        if matches!(state, SessionState::Failed | SessionState::FallbackCompleted) {
            self.upload_id = None;
        }

        let report = SessionReport {
            destination_key: self.destination_key.clone(),
            state,
            parts: self.completed_parts.len(),
            bytes_received: self.bytes_received,
            error,
        };

        metrics::record_session_finished(state.as_str(), report.parts);
        match &report.error {
            Some(e) => warn!(
                s3.key = %report.destination_key,
                state = state.as_str(),
                error = %e,
                "Upload session ended"
            ),
            None => info!(
                s3.key = %report.destination_key,
                state = state.as_str(),
                parts = report.parts,
                bytes = report.bytes_received,
                "Upload session ended"
            ),
        }

        self.report = Some(report.clone());
        report
    }
}
