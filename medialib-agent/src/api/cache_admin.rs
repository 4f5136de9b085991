//! Cache administration endpoints

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use medialib_common::time::now_epoch;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;

/// POST /agent/clear_cache
///
/// Drops the reuse cache, the outbox, and all cursors, and reclaims the
/// file space. The next cycle rescans from scratch.
pub async fn clear_cache(State(app): State<AppState>) -> ApiResult<Json<Value>> {
    db::clear_all(&app.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    app.state.outbox_pending.store(0, Ordering::Relaxed);
    tracing::info!("Agent cache cleared");
    Ok(Json(json!({"ok": true, "cleared": true})))
}

/// POST /agent/compact_cache
pub async fn compact_cache(State(app): State<AppState>) -> ApiResult<Json<Value>> {
    db::vacuum(&app.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    tracing::info!("Agent cache compacted");
    Ok(Json(json!({"ok": true})))
}

/// GET /agent/cache_info
pub async fn cache_info(State(app): State<AppState>) -> ApiResult<Json<Value>> {
    let db_path = &app.db_path;
    let exists = db_path.exists();
    let size_bytes = if exists {
        std::fs::metadata(db_path).map(|md| md.len()).unwrap_or(0)
    } else {
        0
    };

    let index_rows = db::index::count(&app.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let outbox_rows = db::outbox::len(&app.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let progress_rows = db::progress::count(&app.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let (last_seen, last_hashed_at) = db::index::latest_timestamps(&app.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let progress_updated_at = db::progress::latest_update(&app.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "ok": true,
        "db_path": db_path.display().to_string(),
        "exists": exists,
        "size_bytes": size_bytes,
        "rows": {
            "agent_index": index_rows,
            "outbox": outbox_rows,
            "scan_progress": progress_rows,
        },
        "last": {
            "last_seen": last_seen,
            "last_hashed_at": last_hashed_at,
            "progress_updated_at": progress_updated_at,
        },
        "ts": now_epoch() as i64,
    })))
}

pub fn cache_admin_routes() -> Router<AppState> {
    Router::new()
        .route("/agent/clear_cache", post(clear_cache))
        .route("/agent/cache_info", get(cache_info))
        .route("/agent/compact_cache", post(compact_cache))
}
