//! Batch upload and outbox drain
//!
//! Records emitted by the scan pipeline are buffered and sealed into
//! batches on three triggers: the configured batch size, ~2 s elapsed
//! since the first buffered record, or an explicit end-of-phase flush.
//! A sealed batch is POSTed to the host; any failure parks the payload in
//! the durable outbox. The drainer replays the outbox strictly
//! oldest-first, stopping at the first failure and backing off
//! exponentially, and is pulsed after every successful live upload.

use crate::db::outbox;
use crate::state::AgentState;
use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use medialib_common::records::{FileRecord, IngestBatch};
use medialib_common::time::now_epoch;
use reqwest::StatusCode;
use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// POST timeout for a single batch.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Age at which a partially filled buffer is flushed anyway.
const FLUSH_AFTER: Duration = Duration::from_secs(2);

/// Outbox drain backoff bounds.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Host rejected batch: HTTP {0}")]
    Status(StatusCode),
}

impl UploadError {
    /// 4xx responses other than 429 will not succeed on retry. The
    /// payload is still outboxed to avoid silent data loss; this only
    /// affects logging.
    pub fn is_permanent(&self) -> bool {
        match self {
            UploadError::Status(code) => {
                code.is_client_error() && *code != StatusCode::TOO_MANY_REQUESTS
            }
            UploadError::Transport(_) => false,
        }
    }
}

/// Commands accepted by the batcher task.
pub enum BatchCommand {
    Record(FileRecord),
    /// Seal and upload whatever is buffered, then ack.
    Flush(oneshot::Sender<()>),
}

/// Shared upload client for live batches and outbox replay.
pub struct Uploader {
    client: reqwest::Client,
    host_base: String,
    db: sqlx::SqlitePool,
    state: Arc<AgentState>,
    drain_notify: Arc<Notify>,
    gzip: bool,
}

impl Uploader {
    pub fn new(
        host_base: String,
        db: sqlx::SqlitePool,
        state: Arc<AgentState>,
        drain_notify: Arc<Notify>,
        gzip: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            host_base,
            db,
            state,
            drain_notify,
            gzip,
        })
    }

    /// Seal the given records into a fresh batch and deliver it: POST on
    /// the happy path, outbox otherwise. Returns the number of records
    /// accepted by the host.
    pub async fn post_records(&self, files: Vec<FileRecord>) -> usize {
        if files.is_empty() {
            return 0;
        }

        let batch = IngestBatch {
            batch_id: Uuid::new_v4().to_string(),
            files,
        };
        let count = batch.files.len();
        let payload = match serde_json::to_vec(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize batch, dropping");
                self.state.errors.fetch_add(1, Ordering::Relaxed);
                return 0;
            }
        };

        match self.post_payload(&payload, self.gzip).await {
            Ok(()) => {
                self.state.uploaded.fetch_add(count as u64, Ordering::Relaxed);
                self.state.batches.fetch_add(1, Ordering::Relaxed);
                self.state.record_upload(true);
                tracing::info!(
                    batch_id = %batch.batch_id,
                    items = count,
                    bytes = payload.len(),
                    "Posted batch"
                );
                // We are online; give queued payloads a chance right away.
                self.drain_notify.notify_one();
                count
            }
            Err(e) => {
                if e.is_permanent() {
                    tracing::warn!(
                        batch_id = %batch.batch_id,
                        error = %e,
                        "Host rejected batch permanently, queued for operator attention"
                    );
                } else {
                    tracing::warn!(batch_id = %batch.batch_id, error = %e, "Batch post failed, queueing");
                }
                self.state.errors.fetch_add(1, Ordering::Relaxed);
                self.state.record_upload(false);
                if let Err(e) = outbox::enqueue(&self.db, &batch.batch_id, &payload, now_epoch()).await
                {
                    tracing::error!(error = %e, "Failed to enqueue batch to outbox");
                } else {
                    self.state.outbox_pending.fetch_add(1, Ordering::Relaxed);
                }
                0
            }
        }
    }

    /// Park records straight into the outbox without attempting a POST.
    /// Used on shutdown to preserve a partial batch.
    pub async fn outbox_records(&self, files: Vec<FileRecord>) {
        if files.is_empty() {
            return;
        }
        let batch = IngestBatch {
            batch_id: Uuid::new_v4().to_string(),
            files,
        };
        match serde_json::to_vec(&batch) {
            Ok(payload) => {
                if let Err(e) = outbox::enqueue(&self.db, &batch.batch_id, &payload, now_epoch()).await
                {
                    tracing::error!(error = %e, "Failed to park batch in outbox");
                } else {
                    self.state.outbox_pending.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(batch_id = %batch.batch_id, items = batch.files.len(), "Parked partial batch in outbox");
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize partial batch"),
        }
    }

    async fn post_payload(&self, payload: &[u8], gzip: bool) -> Result<(), UploadError> {
        let url = format!("{}/ingest/batch", self.host_base);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        let compressed = if gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            // Writing into a Vec cannot fail.
            encoder.write_all(payload).and_then(|_| encoder.finish()).ok()
        } else {
            None
        };
        request = match compressed {
            Some(body) => request.header("Content-Encoding", "gzip").body(body),
            None => request.body(payload.to_vec()),
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(UploadError::Status(status))
        }
    }

    /// Replay queued payloads oldest-first until the queue is empty or a
    /// delivery fails. Returns the number of batches delivered.
    pub async fn drain_outbox(&self) -> Result<usize, UploadError> {
        let mut drained = 0usize;
        loop {
            let item = match outbox::oldest(&self.db).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Outbox read failed");
                    break;
                }
            };

            self.post_payload(&item.payload_json, false).await?;

            let files = serde_json::from_slice::<IngestBatch>(&item.payload_json)
                .map(|b| b.files.len())
                .unwrap_or(0);

            if let Err(e) = outbox::delete(&self.db, item.id).await {
                tracing::error!(id = item.id, error = %e, "Failed to delete drained outbox item");
                break;
            }
            self.state.outbox_pending.fetch_sub(1, Ordering::Relaxed);
            self.state.uploaded.fetch_add(files as u64, Ordering::Relaxed);
            self.state.batches.fetch_add(1, Ordering::Relaxed);
            drained += 1;
            tracing::info!(batch_id = %item.batch_id, items = files, "Drained outbox batch");
        }
        Ok(drained)
    }
}

/// Background task: drain the outbox on startup, on every pulse, and on
/// a backoff timer after failures.
pub async fn run_drainer(uploader: Arc<Uploader>, cancel: CancellationToken) {
    let mut backoff = BACKOFF_BASE;
    // First attempt immediately at startup.
    let mut wake_at = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = uploader.drain_notify.notified() => {}
            _ = tokio::time::sleep_until(wake_at) => {}
        }

        match uploader.drain_outbox().await {
            Ok(drained) => {
                if drained > 0 {
                    tracing::info!(drained, "Outbox drain complete");
                }
                backoff = BACKOFF_BASE;
                // Idle until pulsed or a periodic re-check.
                wake_at = Instant::now() + BACKOFF_CAP;
            }
            Err(e) => {
                tracing::debug!(error = %e, backoff_s = backoff.as_secs(), "Outbox drain stopped, backing off");
                wake_at = Instant::now() + backoff;
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
        }
    }
}

/// Background task: buffer records and seal batches on size, age, or an
/// explicit flush. The batcher keeps receiving until every sender is
/// gone, so records from tasks finishing inside the shutdown grace are
/// not lost; whatever remains buffered at the end is POSTed normally, or
/// parked in the outbox when shutting down.
pub async fn run_batcher(
    mut rx: mpsc::Receiver<BatchCommand>,
    uploader: Arc<Uploader>,
    batch_size: usize,
    cancel: CancellationToken,
) {
    let batch_size = batch_size.max(1);
    let mut buffer: Vec<FileRecord> = Vec::with_capacity(batch_size);
    let mut first_at: Option<Instant> = None;

    loop {
        let deadline = first_at.map(|t| t + FLUSH_AFTER);

        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(BatchCommand::Record(record)) => {
                    if buffer.is_empty() {
                        first_at = Some(Instant::now());
                    }
                    buffer.push(record);
                    if buffer.len() >= batch_size {
                        uploader.post_records(std::mem::take(&mut buffer)).await;
                        first_at = None;
                    }
                }
                Some(BatchCommand::Flush(ack)) => {
                    uploader.post_records(std::mem::take(&mut buffer)).await;
                    first_at = None;
                    let _ = ack.send(());
                }
                None => {
                    if cancel.is_cancelled() {
                        uploader.outbox_records(std::mem::take(&mut buffer)).await;
                    } else {
                        uploader.post_records(std::mem::take(&mut buffer)).await;
                    }
                    return;
                }
            },
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                uploader.post_records(std::mem::take(&mut buffer)).await;
                first_at = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use axum::body::Bytes;
    use axum::http::HeaderMap;
    use axum::{routing::post, Router};
    use std::io::Read;
    use std::sync::atomic::AtomicBool;

    /// Received batch: id plus the paths it carried.
    type Received = (String, Vec<String>);

    /// Host stub: accepts or rejects `/ingest/batch` depending on a flag
    /// and records received batches in arrival order. Gzip bodies are
    /// decompressed before parsing, mirroring the real host.
    struct HostStub {
        accept: Arc<AtomicBool>,
        received: Arc<std::sync::Mutex<Vec<Received>>>,
        base_url: String,
    }

    async fn spawn_host_stub() -> HostStub {
        let accept = Arc::new(AtomicBool::new(true));
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));

        let accept_flag = Arc::clone(&accept);
        let received_log = Arc::clone(&received);
        let app = Router::new().route(
            "/ingest/batch",
            post(move |headers: HeaderMap, body: Bytes| {
                let accept_flag = Arc::clone(&accept_flag);
                let received_log = Arc::clone(&received_log);
                async move {
                    if !accept_flag.load(Ordering::Relaxed) {
                        return axum::http::StatusCode::SERVICE_UNAVAILABLE;
                    }
                    let gzipped = headers
                        .get("content-encoding")
                        .map(|v| v.as_bytes() == b"gzip")
                        .unwrap_or(false);
                    let raw = if gzipped {
                        let mut decoder = flate2::read::GzDecoder::new(&body[..]);
                        let mut out = Vec::new();
                        if decoder.read_to_end(&mut out).is_err() {
                            return axum::http::StatusCode::BAD_REQUEST;
                        }
                        out
                    } else {
                        body.to_vec()
                    };
                    let batch: IngestBatch = match serde_json::from_slice(&raw) {
                        Ok(batch) => batch,
                        Err(_) => return axum::http::StatusCode::BAD_REQUEST,
                    };
                    let paths = batch.files.iter().map(|f| f.path.clone()).collect();
                    received_log.lock().unwrap().push((batch.batch_id, paths));
                    axum::http::StatusCode::OK
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        HostStub {
            accept,
            received,
            base_url: format!("http://{}", addr),
        }
    }

    fn record(path: &str) -> FileRecord {
        FileRecord {
            kind: medialib_common::records::FileKind::Other,
            path: path.to_string(),
            size: 1,
            mtime: 1.0,
            ctime: 1.0,
            inode_key: "1:1".to_string(),
            ext: "txt".to_string(),
            reason: None,
            hashes: None,
            video_meta: None,
        }
    }

    async fn uploader_for(host: &HostStub) -> (Arc<Uploader>, sqlx::SqlitePool, Arc<AgentState>) {
        let pool = open_memory_pool().await;
        let state = Arc::new(AgentState::new());
        let uploader = Arc::new(
            Uploader::new(
                host.base_url.clone(),
                pool.clone(),
                Arc::clone(&state),
                Arc::new(Notify::new()),
                false,
            )
            .unwrap(),
        );
        (uploader, pool, state)
    }

    #[tokio::test]
    async fn successful_post_updates_counters() {
        let host = spawn_host_stub().await;
        let (uploader, pool, state) = uploader_for(&host).await;

        let sent = uploader.post_records(vec![record("/a"), record("/b")]).await;
        assert_eq!(sent, 2);
        assert_eq!(state.uploaded.load(Ordering::Relaxed), 2);
        assert_eq!(state.batches.load(Ordering::Relaxed), 1);
        assert_eq!(outbox::len(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_post_lands_in_outbox() {
        let host = spawn_host_stub().await;
        host.accept.store(false, Ordering::Relaxed);
        let (uploader, pool, state) = uploader_for(&host).await;

        let sent = uploader.post_records(vec![record("/a")]).await;
        assert_eq!(sent, 0);
        assert_eq!(state.uploaded.load(Ordering::Relaxed), 0);
        assert_eq!(state.errors.load(Ordering::Relaxed), 1);
        assert_eq!(outbox::len(&pool).await.unwrap(), 1);
        assert_eq!(state.outbox_pending.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn drain_replays_fifo_and_counts_records() {
        let host = spawn_host_stub().await;
        host.accept.store(false, Ordering::Relaxed);
        let (uploader, pool, state) = uploader_for(&host).await;

        // Three failed batches pile up in order.
        for path in ["/a", "/b", "/c"] {
            uploader.post_records(vec![record(path)]).await;
        }
        assert_eq!(outbox::len(&pool).await.unwrap(), 3);

        host.accept.store(true, Ordering::Relaxed);
        let drained = uploader.drain_outbox().await.unwrap();
        assert_eq!(drained, 3);
        assert_eq!(outbox::len(&pool).await.unwrap(), 0);
        // Live failures queued 3 records; drain delivered all of them.
        assert_eq!(state.uploaded.load(Ordering::Relaxed), 3);

        let received = host.received.lock().unwrap().clone();
        let paths: Vec<_> = received.iter().map(|(_, p)| p[0].clone()).collect();
        assert_eq!(paths, vec!["/a".to_string(), "/b".to_string(), "/c".to_string()]);
        // Every replayed batch keeps its originally assigned id.
        let ids: std::collections::HashSet<_> = received.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn drain_stops_at_first_failure_preserving_order() {
        let host = spawn_host_stub().await;
        host.accept.store(false, Ordering::Relaxed);
        let (uploader, pool, _state) = uploader_for(&host).await;

        uploader.post_records(vec![record("/a")]).await;
        uploader.post_records(vec![record("/b")]).await;

        // Host still down: nothing is drained and nothing is lost.
        assert!(uploader.drain_outbox().await.is_err());
        assert_eq!(outbox::len(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn batcher_flushes_on_size_and_explicit_flush() {
        let host = spawn_host_stub().await;
        let (uploader, _pool, state) = uploader_for(&host).await;

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_batcher(rx, Arc::clone(&uploader), 2, cancel.clone()));

        // Two records hit the size trigger.
        tx.send(BatchCommand::Record(record("/a"))).await.unwrap();
        tx.send(BatchCommand::Record(record("/b"))).await.unwrap();

        // One more stays buffered until the explicit flush.
        tx.send(BatchCommand::Record(record("/c"))).await.unwrap();
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(BatchCommand::Flush(ack_tx)).await.unwrap();
        ack_rx.await.unwrap();

        assert_eq!(state.uploaded.load(Ordering::Relaxed), 3);
        assert_eq!(state.batches.load(Ordering::Relaxed), 2);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_batcher_parks_partial_batch_in_outbox() {
        let host = spawn_host_stub().await;
        let (uploader, pool, _state) = uploader_for(&host).await;

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_batcher(rx, Arc::clone(&uploader), 100, cancel.clone()));

        tx.send(BatchCommand::Record(record("/a"))).await.unwrap();
        // Give the batcher a beat to buffer it, then shut down. The
        // batcher finishes once every sender is gone.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        drop(tx);
        task.await.unwrap();

        assert_eq!(outbox::len(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn gzip_body_decompresses_to_the_same_batch() {
        let host = spawn_host_stub().await;
        let pool = open_memory_pool().await;
        let state = Arc::new(AgentState::new());
        let uploader = Uploader::new(
            host.base_url.clone(),
            pool.clone(),
            Arc::clone(&state),
            Arc::new(Notify::new()),
            true,
        )
        .unwrap();

        let sent = uploader.post_records(vec![record("/a")]).await;
        assert_eq!(sent, 1);
        let received = host.received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1, vec!["/a".to_string()]);
    }
}
