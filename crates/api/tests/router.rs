//! HTTP surface tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alerting::{AlertDispatcher, SilentSound};
use api::{create_router, AppConfig, AppState, DetectorFactory};
use axum::body::{to_bytes, Body, BodyDataStream};
use axum::http::{header, Request, StatusCode};
use camera_capture::{CameraConfig, VideoFrame};
use dms::{DmsConfig, DmsError, EyeBox, EyeDetector};
use image::{Rgb, RgbImage};
use serde_json::Value;
use tokio_stream::StreamExt;
use tower::ServiceExt;
use uuid::Uuid;

struct ClosedEyes;

impl EyeDetector for ClosedEyes {
    fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<EyeBox>, DmsError> {
        Ok(vec![])
    }
}

struct OpenEyes;

impl EyeDetector for OpenEyes {
    fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<EyeBox>, DmsError> {
        Ok(vec![EyeBox {
            x: 4.0,
            y: 4.0,
            width: 6.0,
            height: 4.0,
            confidence: 0.9,
        }])
    }
}

fn closed_eyes() -> DetectorFactory {
    Arc::new(|| -> Result<Box<dyn EyeDetector>, DmsError> { Ok(Box::new(ClosedEyes)) })
}

fn state(camera: CameraConfig, dms: DmsConfig, detector: DetectorFactory) -> Arc<AppState> {
    let config = AppConfig {
        camera,
        dms,
        ..Default::default()
    };
    let dispatcher = AlertDispatcher::new(Arc::new(SilentSound), tokio::runtime::Handle::current());
    Arc::new(AppState::new(config, detector, dispatcher))
}

fn write_frames(dir: &Path, count: usize) {
    for i in 0..count {
        RgbImage::from_pixel(16, 16, Rgb([40, 40, 40]))
            .save(dir.join(format!("{:04}.png", i)))
            .unwrap();
    }
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = create_router(Arc::clone(state))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(state: &Arc<AppState>, uri: &str) -> Value {
    let (status, body) = get(state, uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_reports_idle_server() {
    let state = state(CameraConfig::default(), DmsConfig::default(), closed_eyes());
    let health = get_json(&state, "/api/v1/health").await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["active_sessions"], 0);
    assert_eq!(health["alerts"]["dispatched"], 0);
}

#[tokio::test]
async fn index_embeds_video_feed() {
    let state = state(CameraConfig::default(), DmsConfig::default(), closed_eyes());
    let (status, body) = get(&state, "/").await;
    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(body).unwrap();
    assert!(page.contains("/video_feed?session="));
    assert!(page.contains("/api/v1/sessions/"));
}

#[tokio::test]
async fn metrics_without_exporter_is_not_found() {
    let state = state(CameraConfig::default(), DmsConfig::default(), closed_eyes());
    let (status, _) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_camera_is_service_unavailable() {
    let state = state(
        CameraConfig::replay("/no/such/frames", 10),
        DmsConfig::default(),
        closed_eyes(),
    );
    let (status, body) = get(&state, "/video_feed").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(String::from_utf8(body).unwrap().contains("Failed to open camera"));
}

#[tokio::test]
async fn missing_detector_is_service_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 1);
    let detector: DetectorFactory = Arc::new(|| -> Result<Box<dyn EyeDetector>, DmsError> {
        Err(DmsError::DetectorUnavailable("no model".into()))
    });

    let state = state(CameraConfig::replay(dir.path(), 10), DmsConfig::default(), detector);
    let (status, _) = get(&state, "/video_feed").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn video_feed_streams_frames_and_records_alert() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 15);

    let dms = DmsConfig {
        blink_threshold_ms: 50,
        drowsiness_threshold_ms: 100,
        ..Default::default()
    };
    let state = state(CameraConfig::replay(dir.path(), 100), dms, closed_eyes());

    let response = create_router(Arc::clone(&state))
        .oneshot(Request::builder().uri("/video_feed").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    // The source does not loop, so the body ends after the last frame
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let boundary = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let parts = body.windows(boundary.len()).filter(|w| *w == &boundary[..]).count();
    assert_eq!(parts, 15);

    let alerts = get_json(&state, "/api/v1/alerts").await;
    assert_eq!(alerts["count"], 1);
    assert_eq!(alerts["data"][0]["closed_duration_ms"], 100);

    let sessions = get_json(&state, "/api/v1/sessions").await;
    assert_eq!(sessions["count"], 0);
}

/// First session sees open eyes, every later one sees closed eyes
fn open_then_closed() -> DetectorFactory {
    let opened = AtomicUsize::new(0);
    Arc::new(move || -> Result<Box<dyn EyeDetector>, DmsError> {
        if opened.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Box::new(OpenEyes))
        } else {
            Ok(Box::new(ClosedEyes))
        }
    })
}

/// Read from an MJPEG body until `parts` frames have arrived, keeping it open
async fn read_parts(body: Body, parts: usize) -> BodyDataStream {
    let boundary = b"--frame\r\n";
    let mut stream = body.into_data_stream();
    let mut seen = 0;
    while seen < parts {
        let chunk = stream.next().await.expect("stream ended early").unwrap();
        seen += chunk.windows(boundary.len()).filter(|w| *w == &boundary[..]).count();
    }
    stream
}

#[tokio::test]
async fn concurrent_viewers_poll_their_own_session() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 5);

    let camera = CameraConfig {
        looping: true,
        ..CameraConfig::replay(dir.path(), 100)
    };
    let dms = DmsConfig {
        blink_threshold_ms: 50,
        drowsiness_threshold_ms: 100,
        ..Default::default()
    };
    let state = state(camera, dms, open_then_closed());

    let awake = Uuid::new_v4();
    let drowsy = Uuid::new_v4();
    let mut bodies = Vec::new();
    for id in [awake, drowsy] {
        let response = create_router(Arc::clone(&state))
            .oneshot(
                Request::builder()
                    .uri(format!("/video_feed?session={}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(response.into_body());
    }

    // 30 frames at 10ms each is well past the 100ms drowsiness threshold
    let mut streaming = Vec::new();
    for body in bodies {
        streaming.push(read_parts(body, 30).await);
    }

    let sessions = get_json(&state, "/api/v1/sessions").await;
    assert_eq!(sessions["count"], 2);

    let first = get_json(&state, &format!("/api/v1/sessions/{}", awake)).await;
    assert_eq!(first["id"], awake.to_string());
    assert_eq!(first["is_drowsy"], false);
    assert_eq!(first["eyes_detected"], 1);

    let second = get_json(&state, &format!("/api/v1/sessions/{}", drowsy)).await;
    assert_eq!(second["id"], drowsy.to_string());
    assert_eq!(second["is_drowsy"], true);
    assert_eq!(second["eyes_detected"], 0);

    // A session id can only stream once
    let (status, _) = get(&state, &format!("/video_feed?session={}", drowsy)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    drop(streaming);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let state = state(CameraConfig::default(), DmsConfig::default(), closed_eyes());
    let (status, body) = get(&state, &format!("/api/v1/sessions/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8(body).unwrap().contains("not found"));
}

#[tokio::test]
async fn failed_open_releases_session_id() {
    let state = state(
        CameraConfig::replay("/no/such/frames", 10),
        DmsConfig::default(),
        closed_eyes(),
    );
    let uri = format!("/video_feed?session={}", Uuid::new_v4());
    for _ in 0..2 {
        let (status, _) = get(&state, &uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
    assert_eq!(get_json(&state, "/api/v1/sessions").await["count"], 0);
}
