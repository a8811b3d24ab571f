//! Session Routes

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use dms::{DmsAnalysis, EyePhase, OverlayLine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Latest state of one streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub frames: u64,
    pub eyes_detected: usize,
    pub blink_counter: u32,
    pub is_drowsy: bool,
    pub alert_on_cooldown: bool,
    pub phase: EyePhase,
    pub overlay: Vec<OverlayLine>,
}

impl SessionSnapshot {
    pub fn new(id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            frames: 0,
            eyes_detected: 0,
            blink_counter: 0,
            is_drowsy: false,
            alert_on_cooldown: false,
            phase: EyePhase::Open,
            overlay: Vec::new(),
        }
    }

    /// Copy the latest frame's status
    pub fn update(&mut self, analysis: &DmsAnalysis, frames: u64) {
        self.frames = frames;
        self.eyes_detected = analysis.eyes.len();
        self.blink_counter = analysis.decision.blink_counter;
        self.is_drowsy = analysis.decision.is_drowsy;
        self.alert_on_cooldown = analysis.decision.alert_on_cooldown;
        self.phase = analysis.decision.phase;
        self.overlay = analysis.overlay.clone();
    }
}

/// Response for sessions endpoint
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub data: Vec<SessionSnapshot>,
    pub count: usize,
}

/// Get live sessions, oldest first
pub async fn get_sessions(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let mut data: Vec<SessionSnapshot> = state.sessions.read().await.values().cloned().collect();
    data.sort_by_key(|s| s.started_at);

    Json(SessionResponse {
        count: data.len(),
        data,
    })
}

/// Get one session by the id its viewer chose
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .sessions
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(ApiError::SessionNotFound(id))
}
