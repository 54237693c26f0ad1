//! Recent log records

use axum::{extract::State, routing::get, Json, Router};
use sw_common::log_buffer::LogSnapshot;

use crate::AppState;

/// GET /logs, newest first
pub async fn recent_logs(State(state): State<AppState>) -> Json<LogSnapshot> {
    Json(state.log_buffer.snapshot())
}

pub fn log_routes() -> Router<AppState> {
    Router::new().route("/logs", get(recent_logs))
}
