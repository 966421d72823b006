//! Streaming ingest endpoint
//!
//! A producer opens one request on the ingest path and streams its payload as
//! the request body (typically `Transfer-Encoding: chunked`). Each data frame
//! becomes one chunk of a fresh upload session. End of body, or the producer
//! going away mid-body, ends the stream; whatever was received is settled
//! and the session report comes back as JSON.

use super::AppState;
use crate::upload::{driver, SessionHandle, SessionReport, UploadSession};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Response, StatusCode};
use std::fmt::Display;
use tracing::{debug, info, warn};

/// Run one upload session fed by `body`
#[tracing::instrument(name = "ingest", skip(body, state), fields(s3.key = tracing::field::Empty))]
pub async fn ingest<B>(body: B, state: &AppState) -> SessionReport
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let key = state.config.upload.generate_key();
    tracing::Span::current().record("s3.key", key.as_str());
    info!("Producer connected");

    let guard = state.registry.register(key.clone());
    let session = UploadSession::new(
        state.store.clone(),
        key,
        state.config.upload.min_part_size,
    );
    // The registry entry outlives this handler if the producer drops mid-body.
    let handle = driver::spawn_guarded(session, state.config.server.channel_capacity, guard);

    let chunks = forward_body(body, &handle).await;
    debug!(chunks, "Producer stream ended");

    handle.join().await
}

/// Feed body frames into the session until either side stops
async fn forward_body<B>(body: B, handle: &SessionHandle) -> usize
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let mut body = std::pin::pin!(body);
    let mut chunks = 0;

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Producer disconnected mid-stream");
                break;
            }
        };
        // Trailers carry no payload.
        let Ok(data) = frame.into_data() else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        if !handle.send_chunk(data).await {
            warn!("Session stopped accepting data");
            break;
        }
        chunks += 1;
    }

    chunks
}

/// JSON response for a finished session
pub fn report_response(report: &SessionReport) -> Response<String> {
    let status = if report.state.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    let body = match serde_json::to_string(report) {
        Ok(body) => body,
        Err(e) => format!(r#"{{"error":"failed to encode report: {}"}}"#, e),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
