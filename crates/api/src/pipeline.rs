//! Per-session frame pipeline: acquire, detect, decide, alert, annotate

use alerting::{AlertDispatcher, AlertEvent};
use camera_capture::{open_source, CameraConfig, FrameSource};
use dms::{DmsAnalysis, DmsConfig, DmsSession, EyeDetector};
use image::RgbImage;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::overlay;
use crate::ApiError;

/// Result of one pipeline step
pub struct ProcessedFrame {
    pub analysis: DmsAnalysis,
    /// Frame with overlay drawn
    pub annotated: RgbImage,
    /// Set when this frame fired an alert
    pub alert: Option<AlertEvent>,
}

/// One detection session with its own source, detector and state
pub struct FramePipeline {
    id: Uuid,
    source: Box<dyn FrameSource>,
    session: DmsSession,
    dispatcher: AlertDispatcher,
}

impl FramePipeline {
    /// Open a session over the configured camera or frame directory
    ///
    /// Camera and detector failures are fatal here, before any frame is read.
    pub fn open(
        camera: &CameraConfig,
        dms: &DmsConfig,
        detector: Box<dyn EyeDetector>,
        dispatcher: AlertDispatcher,
    ) -> Result<Self, ApiError> {
        let source = open_source(camera)?;
        Self::new(source, dms, detector, dispatcher)
    }

    pub fn new(
        source: Box<dyn FrameSource>,
        dms: &DmsConfig,
        detector: Box<dyn EyeDetector>,
        dispatcher: AlertDispatcher,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            id: Uuid::new_v4(),
            source,
            session: DmsSession::new(dms, detector)?,
            dispatcher,
        })
    }

    /// Use a caller-chosen session id
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> &DmsSession {
        &self.session
    }

    /// Process the next frame; `Ok(None)` once the source is exhausted
    pub fn step(&mut self) -> Result<Option<ProcessedFrame>, ApiError> {
        let Some(frame) = self.source.next_frame()? else {
            debug!(session = %self.id, "Frame source ended");
            return Ok(None);
        };

        let analysis = self.session.analyze(&frame)?;
        metrics::counter!("dms_frames_total").increment(1);

        let alert = if analysis.should_alert() {
            let decision = &analysis.decision;
            let event = AlertEvent::new(
                self.id,
                saturating_millis(decision.closed_duration.unwrap_or_default()),
                decision.blink_counter,
            );
            // Fire-and-forget: cooldown is already set in the session state
            drop(self.dispatcher.dispatch(event.clone()));
            Some(event)
        } else {
            None
        };

        let mut annotated = frame.to_rgb_image()?;
        overlay::annotate(&mut annotated, &analysis)?;

        Ok(Some(ProcessedFrame {
            analysis,
            annotated,
            alert,
        }))
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::SilentSound;
    use camera_capture::{CameraError, VideoFrame};
    use dms::{DmsError, EyeBox};
    use std::sync::Arc;
    use tokio::runtime::Handle;

    struct Closed;

    impl EyeDetector for Closed {
        fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<EyeBox>, DmsError> {
            Ok(vec![])
        }
    }

    /// Black frames every 100ms
    struct Synthetic {
        remaining: u32,
        sequence: u32,
    }

    impl FrameSource for Synthetic {
        fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let seq = self.sequence;
            self.sequence += 1;
            VideoFrame::new(vec![0; 32 * 32 * 3], 32, 32, u64::from(seq) * 100_000_000, seq)
                .map(Some)
        }
    }

    #[tokio::test]
    async fn test_pipeline_fires_single_alert() {
        let dispatcher = AlertDispatcher::new(Arc::new(SilentSound), Handle::current());
        let mut pipeline = FramePipeline::new(
            Box::new(Synthetic { remaining: 30, sequence: 0 }),
            &DmsConfig::default(),
            Box::new(Closed),
            dispatcher.clone(),
        )
        .unwrap();

        let mut alerts = Vec::new();
        while let Some(processed) = pipeline.step().unwrap() {
            assert_eq!(processed.annotated.dimensions(), (32, 32));
            if let Some(alert) = processed.alert {
                assert_eq!(alert.session_id, pipeline.id());
                alerts.push(processed.analysis.session_time);
            }
        }

        // 30 frames span 2.9s; one alert at the 2.0s frame
        assert_eq!(alerts, vec![Duration::from_secs(2)]);
        assert_eq!(dispatcher.stats().dispatched, 1);
        assert_eq!(pipeline.session().frames(), 30);
    }

    #[test]
    fn test_closed_duration_millis_saturate() {
        assert_eq!(saturating_millis(Duration::from_millis(2100)), 2100);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_with_id_tags_alerts() {
        let id = Uuid::new_v4();
        let dispatcher = AlertDispatcher::new(Arc::new(SilentSound), Handle::current());
        let mut pipeline = FramePipeline::new(
            Box::new(Synthetic { remaining: 21, sequence: 0 }),
            &DmsConfig::default(),
            Box::new(Closed),
            dispatcher,
        )
        .unwrap()
        .with_id(id);

        let mut alert = None;
        while let Some(processed) = pipeline.step().unwrap() {
            alert = alert.or(processed.alert);
        }
        let alert = alert.unwrap();
        assert_eq!(alert.session_id, id);
        assert_eq!(alert.closed_duration_ms, 2000);
    }

    #[tokio::test]
    async fn test_open_missing_camera_is_fatal() {
        let dispatcher = AlertDispatcher::new(Arc::new(SilentSound), Handle::current());
        let camera = CameraConfig::replay("/no/such/frames", 10);
        let result =
            FramePipeline::open(&camera, &DmsConfig::default(), Box::new(Closed), dispatcher);
        assert!(matches!(result, Err(ApiError::Camera(CameraError::Open(_)))));
    }
}
