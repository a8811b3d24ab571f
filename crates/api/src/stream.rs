//! MJPEG streaming
//!
//! `multipart/x-mixed-replace` with one JPEG part per processed frame. Each
//! connection owns a [`FramePipeline`] running on the blocking pool; the
//! pipeline stops when the client goes away or the source ends.

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::{BufMut, Bytes, BytesMut};
use camera_capture::frame::encode_jpeg;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::FramePipeline;
use crate::routes::sessions::SessionSnapshot;
use crate::{ApiError, AppState};

pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Frames buffered ahead of a slow client
const STREAM_BUFFER: usize = 2;

/// Wrap a JPEG as one multipart part
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(jpeg.len() + 64);
    part.put_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// `GET /video_feed` query
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Session id chosen by the viewer, so it can poll its own status
    pub session: Option<Uuid>,
}

/// `GET /video_feed`
pub async fn video_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Result<Response, ApiError> {
    let id = query.session.unwrap_or_else(Uuid::new_v4);
    {
        let mut sessions = state.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(ApiError::SessionConflict(id));
        }
        sessions.insert(id, SessionSnapshot::new(id, Utc::now()));
    }

    let open_state = Arc::clone(&state);
    let opened = tokio::task::spawn_blocking(move || -> Result<FramePipeline, ApiError> {
        let detector = (open_state.detector)()?;
        FramePipeline::open(
            &open_state.config.camera,
            &open_state.config.dms,
            detector,
            open_state.dispatcher.clone(),
        )
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))
    .and_then(|opened| opened);

    let pipeline = match opened {
        Ok(pipeline) => pipeline.with_id(id),
        Err(e) => {
            state.sessions.write().await.remove(&id);
            return Err(e);
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(STREAM_BUFFER);
    tokio::task::spawn_blocking(move || run_stream(pipeline, state, tx));

    Ok((
        [(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}

/// Session loop for one client (blocking)
fn run_stream(
    mut pipeline: FramePipeline,
    state: Arc<AppState>,
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
) {
    let id = pipeline.id();
    let interval = state.config.camera.frame_interval();
    let quality = state.config.camera.jpeg_quality;

    metrics::gauge!("dms_active_sessions").increment(1.0);
    info!(session = %id, "Stream session started");

    let mut next_at = Instant::now();
    while !tx.is_closed() {
        if let Some(wait) = next_at.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
        next_at = Instant::now() + interval;

        let processed = match pipeline.step() {
            Ok(Some(processed)) => processed,
            Ok(None) => break,
            Err(ApiError::Dms(e)) => {
                // Detection hiccups skip the frame
                warn!(session = %id, "Frame skipped: {}", e);
                continue;
            }
            Err(e) => {
                error!(session = %id, "Stream session failed: {}", e);
                break;
            }
        };

        if let Some(snapshot) = state.sessions.blocking_write().get_mut(&id) {
            snapshot.update(&processed.analysis, pipeline.session().frames());
        }
        if let Some(event) = processed.alert {
            state.record_alert_blocking(event);
        }

        let jpeg = match encode_jpeg(&processed.annotated, quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!(session = %id, "Frame not encoded: {}", e);
                continue;
            }
        };

        if tx.blocking_send(Ok(mjpeg_part(&jpeg))).is_err() {
            info!(session = %id, "Client disconnected");
            break;
        }
    }

    state.sessions.blocking_write().remove(&id);
    metrics::gauge!("dms_active_sessions").decrement(1.0);
    info!(session = %id, frames = pipeline.session().frames(), "Stream session ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mjpeg_part_framing() {
        let part = mjpeg_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(part.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }
}
