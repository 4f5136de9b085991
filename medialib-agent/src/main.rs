//! medialib-agent - MediaLib remote scan agent
//!
//! Discovers media files under host-configured roots, classifies and
//! fingerprints them, probes video metadata, and feeds everything to the
//! host ingest API in batches. Local state (reuse cache, outbox, scan
//! cursors) lives in `~/.medialib/agent_cache.db`; upload outages queue
//! durably and drain when the host returns.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use medialib_agent::config::{normalize_host_url, ConfigSource};
use medialib_agent::services::Orchestrator;
use medialib_agent::state::AgentState;
use medialib_agent::{build_router, db, AppState, CONTROL_PORT};

/// MediaLib remote agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address: bare IP/hostname (port defaults to 8765) or a full
    /// http(s) URL
    host: String,

    /// Delete the local agent cache before starting
    #[arg(long)]
    clear_cache: bool,
}

fn state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("cannot determine home directory")?;
    Ok(home.join(".medialib"))
}

/// stdout plus a non-blocking file layer writing `~/.medialib/agent.log`.
/// The returned guard must stay alive for the file writer to flush.
fn init_logging(state_dir: &PathBuf) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("creating state directory {}", state_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(state_dir, "agent.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medialib_agent=info,medialib_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let state_dir = state_dir()?;
    let _log_guard = init_logging(&state_dir)?;

    info!("Starting medialib-agent");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let host_base = normalize_host_url(&args.host)?;
    info!(host = %host_base, "Host ingest endpoint");

    let db_path = state_dir.join("agent_cache.db");
    if args.clear_cache && db_path.exists() {
        match std::fs::remove_file(&db_path) {
            Ok(()) => info!(path = %db_path.display(), "Cleared agent cache"),
            Err(e) => warn!(path = %db_path.display(), error = %e, "Failed to clear agent cache"),
        }
    }

    // Local persistent state. Failure here is fatal: an agent that
    // cannot remember anything would re-upload the world forever.
    let db = db::init_pool(&db_path)
        .await
        .context("initializing agent cache store")?;
    info!(path = %db_path.display(), "Agent cache ready");

    let state = Arc::new(AgentState::new());
    let scan_now = Arc::new(Notify::new());
    let drain_notify = Arc::new(Notify::new());
    let cancel = CancellationToken::new();

    // Restore the outbox depth counter from disk.
    if let Ok(pending) = db::outbox::len(&db).await {
        state
            .outbox_pending
            .store(pending as u64, std::sync::atomic::Ordering::Relaxed);
        if pending > 0 {
            info!(pending, "Outbox has queued batches from a previous run");
        }
    }

    // Background outbox drainer, shared with the orchestrator's
    // uploaders through the notify handle.
    let drain_uploader = Arc::new(
        medialib_agent::services::Uploader::new(
            host_base.clone(),
            db.clone(),
            Arc::clone(&state),
            Arc::clone(&drain_notify),
            false,
        )
        .context("building upload client")?,
    );
    let drainer = tokio::spawn(medialib_agent::services::uploader::run_drainer(
        drain_uploader,
        cancel.clone(),
    ));

    // The orchestrator owns the scan lifecycle.
    let config_source = ConfigSource::new(host_base.clone(), db.clone())?;
    let orchestrator = Orchestrator::new(
        db.clone(),
        Arc::clone(&state),
        config_source,
        Arc::clone(&scan_now),
        Arc::clone(&drain_notify),
        cancel.clone(),
    );
    let orchestrator_task = tokio::spawn(orchestrator.run());

    // Control API. A bind failure is fatal: the host can't manage an
    // unreachable agent.
    let app = build_router(AppState::new(
        db.clone(),
        Arc::clone(&state),
        Arc::clone(&scan_now),
        db_path.clone(),
    ));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", CONTROL_PORT))
        .await
        .with_context(|| format!("binding control port {}", CONTROL_PORT))?;
    info!("Control API listening on http://0.0.0.0:{}", CONTROL_PORT);

    let server_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                }
                _ = server_cancel.cancelled() => {}
            }
        })
        .await
        .context("control API server failed")?;

    // Wind down: stop new work, give in-flight tasks their grace, park
    // any partial batch in the outbox.
    cancel.cancel();
    let shutdown = async {
        if let Err(e) = orchestrator_task.await {
            error!(error = %e, "Orchestrator task failed");
        }
        if let Err(e) = drainer.await {
            error!(error = %e, "Drainer task failed");
        }
    };
    if tokio::time::timeout(Duration::from_secs(12), shutdown)
        .await
        .is_err()
    {
        warn!("Background tasks did not stop within the grace period");
    }

    db.close().await;
    info!("medialib-agent stopped");
    Ok(())
}
