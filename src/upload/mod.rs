//! Upload module
//!
//! Turns a live byte stream into one S3 object. The pieces, leaves first:
//!
//! - [`buffer::PartBuffer`] accumulates bytes until a part is due
//! - [`store::ObjectStore`] is the five-call seam to the object store
//! - [`session::UploadSession`] is the multipart state machine for one key
//! - [`driver`] runs one session per connection as an exclusive task

use serde::{Serialize, Serializer};
use thiserror::Error;

pub mod buffer;
pub mod driver;
pub mod session;
pub mod store;

pub use buffer::PartBuffer;
pub use driver::{SessionEvent, SessionHandle};
pub use session::UploadSession;
pub use store::{ObjectStore, S3ObjectStore};

/// Errors reported by the object store seam
///
/// Only `TooSmall` is acted upon differently; every other failure (auth,
/// network, throttling, timeout) is terminal for the attempt in flight.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Entity too small: {0}")]
    TooSmall(String),

    #[error("Object store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_too_small(&self) -> bool {
        matches!(self, StoreError::TooSmall(_))
    }
}

/// Session errors, one per way an upload can end badly
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Failed to initiate multipart upload: {0}")]
    Initiation(StoreError),

    #[error("Failed to upload part {part_number}: {source}")]
    PartUpload {
        part_number: u32,
        #[source]
        source: StoreError,
    },

    #[error("Failed to complete multipart upload: {0}")]
    Completion(StoreError),

    #[error("Fallback whole-object write failed: {0}")]
    FallbackWrite(String),

    #[error("Stream ended without any data")]
    EmptyStream,

    #[error("Operation not allowed in state {0:?}")]
    InvalidState(SessionState),

    #[error("Upload session task stopped: {0}")]
    Interrupted(String),
}

/// Lifecycle of one upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitiated,
    Active,
    Finalizing,
    Completed,
    FallbackCompleted,
    Aborted,
    Failed,
}

impl SessionState {
    /// Terminal states accept no further events
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::FallbackCompleted
                | SessionState::Aborted
                | SessionState::Failed
        )
    }

    /// The object exists in the store
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::FallbackCompleted
        )
    }

    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitiated => "uninitiated",
            SessionState::Active => "active",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::FallbackCompleted => "fallback_completed",
            SessionState::Aborted => "aborted",
            SessionState::Failed => "failed",
        }
    }
}

/// Receipt for one stored part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Final outcome of a session, returned to the front end
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub destination_key: String,
    pub state: SessionState,
    pub parts: usize,
    pub bytes_received: u64,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SessionError>,
}

fn serialize_error<S: Serializer>(
    error: &Option<SessionError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
