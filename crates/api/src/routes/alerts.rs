//! Alert Routes

use alerting::AlertEvent;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;

/// Query parameters for alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    /// Newest first
    pub data: Vec<AlertEvent>,
    pub count: usize,
    pub played: u64,
    pub failed: u64,
}

/// Get recent alerts
pub async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQuery>,
) -> Json<AlertResponse> {
    let data: Vec<AlertEvent> = state
        .alerts
        .read()
        .await
        .iter()
        .rev()
        .take(params.limit)
        .cloned()
        .collect();
    let stats = state.dispatcher.stats();

    Json(AlertResponse {
        count: data.len(),
        data,
        played: stats.played,
        failed: stats.failed,
    })
}
