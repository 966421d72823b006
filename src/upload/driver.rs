//! Session driver
//!
//! Each upload session runs as its own task and is fed through a bounded
//! channel, so chunks are ingested strictly one after another and a slow
//! store pushes back on the connection instead of growing memory.
//!
//! # Example
//!
//! ```ignore
//! let session = UploadSession::new(store, "audio/take-1.wav", S3_MIN_PART_SIZE);
//! let handle = driver::spawn(session, 32);
//! handle.send_chunk(chunk).await;
//! let report = handle.join().await;
//! ```

use super::{ObjectStore, SessionError, SessionReport, SessionState, UploadSession};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Events delivered to a running session, in arrival order
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Chunk(Bytes),
    /// The producer is done, cleanly or by disconnecting
    StreamEnded,
}

/// Producer side of a running session
pub struct SessionHandle {
    destination_key: String,
    tx: mpsc::Sender<SessionEvent>,
    ended: AtomicBool,
    task: JoinHandle<SessionReport>,
}

/// Run `session` on its own task
pub fn spawn<S>(session: UploadSession<S>, capacity: usize) -> SessionHandle
where
    S: ObjectStore + ?Sized + 'static,
{
    spawn_guarded(session, capacity, ())
}

/// Like [`spawn`], but `guard` lives on the session task and is dropped only
/// once the session has reached a terminal state.
pub fn spawn_guarded<S, G>(session: UploadSession<S>, capacity: usize, guard: G) -> SessionHandle
where
    S: ObjectStore + ?Sized + 'static,
    G: Send + 'static,
{
    let destination_key = session.destination_key().to_string();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(async move {
        let report = drive(session, rx).await;
        drop(guard);
        report
    });

    SessionHandle {
        destination_key,
        tx,
        ended: AtomicBool::new(false),
        task,
    }
}

async fn drive<S>(mut session: UploadSession<S>, mut rx: mpsc::Receiver<SessionEvent>) -> SessionReport
where
    S: ObjectStore + ?Sized,
{
    if session.start().await.is_err() {
        return session.finalize().await;
    }

    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Chunk(chunk) => {
                if session.ingest(chunk).await.is_err() && session.state().is_terminal() {
                    break;
                }
            }
            SessionEvent::StreamEnded => break,
        }
    }

    // Dropping the receiver here refuses any chunk still in flight.
    drop(rx);
    session.finalize().await
}

impl SessionHandle {
    pub fn destination_key(&self) -> &str {
        &self.destination_key
    }

    /// Queue a chunk, waiting for room. Returns `false` once the session no
    /// longer accepts data.
    pub async fn send_chunk(&self, chunk: Bytes) -> bool {
        if self.ended.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(SessionEvent::Chunk(chunk)).await.is_ok()
    }

    /// Signal end of stream. Only the first call sends anything.
    pub async fn finish(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.tx.send(SessionEvent::StreamEnded).await.is_err() {
            debug!(s3.key = %self.destination_key, "Session already stopped before stream end");
        }
    }

    /// End the stream and wait for the session's final report
    pub async fn join(self) -> SessionReport {
        self.finish().await;
        let SessionHandle {
            destination_key,
            tx,
            task,
            ..
        } = self;
        drop(tx);

        match task.await {
            Ok(report) => report,
            Err(e) => {
                error!(s3.key = %destination_key, error = %e, "Upload session task failed");
                SessionReport {
                    destination_key,
                    state: SessionState::Failed,
                    parts: 0,
                    bytes_received: 0,
                    error: Some(SessionError::Interrupted(e.to_string())),
                }
            }
        }
    }
}
