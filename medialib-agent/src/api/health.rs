//! Liveness endpoint

use crate::AppState;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

/// GET /agent/ping
///
/// Cheap liveness check used by the host to detect agents.
pub async fn ping() -> Json<Value> {
    Json(json!({"ok": true}))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/agent/ping", get(ping))
}
