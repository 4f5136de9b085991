//! Scan statistics endpoint

use crate::error::ApiResult;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::Ordering;

#[derive(Debug, Serialize)]
pub struct Totals {
    pub files: u64,
    pub videos: u64,
}

#[derive(Debug, Serialize)]
pub struct Counters {
    pub seen: u64,
    pub video: u64,
    pub image: u64,
    pub subtitle: u64,
    pub xml: u64,
    pub other: u64,
    pub junk: u64,
    pub outbox_pending: u64,
    pub workers: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub active: bool,
    pub phase: &'static str,
    pub uploaded: u64,
    pub batches: u64,
    pub errors: u64,
    pub rate_files_per_s: f64,
    pub totals: Totals,
    pub counters: Counters,
}

/// GET /agent/stats
pub async fn stats(State(app): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let state = &app.state;
    Ok(Json(StatsResponse {
        active: state.active.load(Ordering::Relaxed),
        phase: state.phase().as_str(),
        uploaded: state.uploaded.load(Ordering::Relaxed),
        batches: state.batches.load(Ordering::Relaxed),
        errors: state.errors.load(Ordering::Relaxed),
        rate_files_per_s: state.rate_files_per_s(),
        totals: Totals {
            files: state.total_files.load(Ordering::Relaxed),
            videos: state.total_videos.load(Ordering::Relaxed),
        },
        counters: Counters {
            seen: state.seen.load(Ordering::Relaxed),
            video: state.kind_video.load(Ordering::Relaxed),
            image: state.kind_image.load(Ordering::Relaxed),
            subtitle: state.kind_subtitle.load(Ordering::Relaxed),
            xml: state.kind_xml.load(Ordering::Relaxed),
            other: state.kind_other.load(Ordering::Relaxed),
            junk: state.kind_junk.load(Ordering::Relaxed),
            outbox_pending: state.outbox_pending.load(Ordering::Relaxed),
            workers: state.workers.load(Ordering::Relaxed),
        },
    }))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/agent/stats", get(stats))
}
