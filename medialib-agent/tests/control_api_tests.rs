//! Control API integration tests
//!
//! Serves the real router on an ephemeral port and exercises every
//! endpoint over HTTP.

use medialib_agent::state::AgentState;
use medialib_agent::{build_router, db, AppState};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

struct TestServer {
    _state_dir: TempDir,
    base_url: String,
    pool: sqlx::SqlitePool,
    state: Arc<AgentState>,
    scan_now: Arc<Notify>,
    client: reqwest::Client,
}

async fn spawn_server() -> TestServer {
    let state_dir = TempDir::new().unwrap();
    let db_path = state_dir.path().join("agent_cache.db");
    let pool = db::init_pool(&db_path).await.unwrap();

    let state = Arc::new(AgentState::new());
    let scan_now = Arc::new(Notify::new());
    let app = build_router(AppState::new(
        pool.clone(),
        Arc::clone(&state),
        Arc::clone(&scan_now),
        db_path,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    TestServer {
        _state_dir: state_dir,
        base_url: format!("http://{}", addr),
        pool,
        state,
        scan_now,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn ping_responds_ok() {
    let server = spawn_server().await;
    let response = server.get("/agent/ping").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn stats_reports_counters_and_phase() {
    let server = spawn_server().await;
    server
        .state
        .uploaded
        .store(42, std::sync::atomic::Ordering::Relaxed);

    let body: Value = server.get("/agent/stats").await.json().await.unwrap();
    assert_eq!(body["active"], false);
    assert_eq!(body["phase"], "idle");
    assert_eq!(body["uploaded"], 42);
    assert!(body["totals"]["files"].is_u64());
    assert!(body["counters"]["outbox_pending"].is_u64());
    assert!(body["rate_files_per_s"].is_number());
}

#[tokio::test]
async fn ls_lists_directories_and_404s_missing_paths() {
    let server = spawn_server().await;

    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("movies")).unwrap();
    std::fs::write(dir.path().join("note.txt"), b"hello").unwrap();

    let response = server
        .get(&format!("/agent/ls?path={}", dir.path().to_string_lossy()))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "movies");
    assert_eq!(entries[0]["kind"], "dir");
    assert_eq!(entries[1]["name"], "note.txt");
    assert_eq!(entries[1]["size"], 5);

    let response = server.get("/agent/ls?path=/definitely/not/here").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn scan_now_starts_only_when_idle() {
    let server = spawn_server().await;

    // Idle: the trigger is accepted and the phase moves to hash.
    let body: Value = server.post("/agent/scan_now").await.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["started"], true);
    assert_eq!(body["phase"], "hash");

    // The orchestrator-side notify was pulsed.
    let notified =
        tokio::time::timeout(std::time::Duration::from_secs(1), server.scan_now.notified()).await;
    assert!(notified.is_ok());

    // Already scanning: no-op reporting the current phase.
    server
        .state
        .set_phase(medialib_agent::state::ScanPhase::Probe);
    let body: Value = server.post("/agent/scan_now").await.json().await.unwrap();
    assert_eq!(body["started"], false);
    assert_eq!(body["phase"], "probe");
}

#[tokio::test]
async fn cache_info_reports_rows_and_clear_cache_empties_them() {
    let server = spawn_server().await;

    db::index::touch(&server.pool, "/r/a.mkv", "1:1", 10, 1.0, 1.0, 5.0)
        .await
        .unwrap();
    db::outbox::enqueue(&server.pool, "b-1", b"{}", 1.0)
        .await
        .unwrap();
    db::progress::set(&server.pool, "/r", "hash", "/r/a.mkv", 2.0)
        .await
        .unwrap();

    let body: Value = server.get("/agent/cache_info").await.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["exists"], true);
    assert_eq!(body["rows"]["agent_index"], 1);
    assert_eq!(body["rows"]["outbox"], 1);
    assert_eq!(body["rows"]["scan_progress"], 1);
    assert_eq!(body["last"]["last_seen"], 5.0);
    assert!(body["size_bytes"].as_u64().unwrap() > 0);

    let body: Value = server.post("/agent/clear_cache").await.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["cleared"], true);

    let body: Value = server.get("/agent/cache_info").await.json().await.unwrap();
    assert_eq!(body["rows"]["agent_index"], 0);
    assert_eq!(body["rows"]["outbox"], 0);
    assert_eq!(body["rows"]["scan_progress"], 0);
}

#[tokio::test]
async fn compact_cache_succeeds() {
    let server = spawn_server().await;
    let body: Value = server
        .post("/agent/compact_cache")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
}
