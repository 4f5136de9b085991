//! medialib-agent library interface
//!
//! Exposes the application state, router construction, and all pipeline
//! services for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod state;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::state::AgentState;

/// Control port the host expects agents to listen on.
pub const CONTROL_PORT: u16 = 8877;

/// Application state shared across control API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Agent cache database pool
    pub db: SqlitePool,
    /// Shared scan state and counters
    pub state: Arc<AgentState>,
    /// Wakes an idle orchestrator
    pub scan_now: Arc<Notify>,
    /// Location of the cache store, for diagnostics
    pub db_path: PathBuf,
}

impl AppState {
    pub fn new(db: SqlitePool, state: Arc<AgentState>, scan_now: Arc<Notify>, db_path: PathBuf) -> Self {
        Self {
            db,
            state,
            scan_now,
            db_path,
        }
    }
}

/// Build the control API router.
///
/// Endpoints:
/// - GET  /agent/ping - liveness
/// - GET  /agent/stats - scan statistics
/// - GET  /agent/ls - directory listing for root selection
/// - POST /agent/scan_now - trigger a scan cycle
/// - POST /agent/clear_cache - drop local state
/// - GET  /agent/cache_info - cache diagnostics
/// - POST /agent/compact_cache - reclaim cache space
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::stats_routes())
        .merge(api::browse_routes())
        .merge(api::scan_routes())
        .merge(api::cache_admin_routes())
        .with_state(state)
}
