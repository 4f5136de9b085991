//! Scan trigger endpoint

use crate::state::ScanPhase;
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};

/// POST /agent/scan_now
///
/// Wakes an idle orchestrator immediately. A no-op while a scan is
/// already running; either way the current phase is reported.
pub async fn scan_now(State(app): State<AppState>) -> Json<Value> {
    let phase = app.state.phase();
    if phase == ScanPhase::Idle {
        app.scan_now.notify_one();
        tracing::info!("scan_now accepted");
        Json(json!({"ok": true, "started": true, "phase": ScanPhase::Hash.as_str()}))
    } else {
        Json(json!({"ok": true, "started": false, "phase": phase.as_str()}))
    }
}

pub fn scan_routes() -> Router<AppState> {
    Router::new().route("/agent/scan_now", post(scan_now))
}
