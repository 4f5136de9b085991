//! Scan orchestration
//!
//! Drives the two-pass ingest cycle: Pass 1 hashes and uploads base
//! records for every classified file, Pass 2 probes video files and
//! uploads their metadata. Between cycles the agent idles, waking on a
//! timer or a `scan_now` pulse. The reuse cache keeps both passes from
//! repeating expensive work across restarts and cycles.

use crate::config::ConfigSource;
use crate::db::index::ReuseCache;
use crate::db::progress;
use crate::services::classifier::Classifier;
use crate::services::hasher::{self, HashAlgo};
use crate::services::permits::{self, in_offpeak, PermitPool};
use crate::services::prober;
use crate::services::scanner::{self, ScanEntry};
use crate::services::uploader::{run_batcher, BatchCommand, Uploader};
use crate::state::{AgentState, ScanPhase};
use anyhow::Result;
use chrono::{Local, Timelike};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use medialib_common::config::AgentConfig;
use medialib_common::records::{FileHashes, FileKind, FileRecord};
use medialib_common::time::now_epoch;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sleep after a cycle that uploaded something.
const CYCLE_SLEEP_PRODUCTIVE: Duration = Duration::from_secs(300);
/// Sleep after a cycle that uploaded nothing.
const CYCLE_SLEEP_EMPTY: Duration = Duration::from_secs(60);
/// Poll interval while the host has no roots configured.
const NO_ROOTS_POLL: Duration = Duration::from_secs(10);
/// Retry interval after a failed cycle or config fetch.
const CYCLE_RETRY: Duration = Duration::from_secs(15);
/// How long in-flight tasks may finish after a shutdown request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Cursor phase names as persisted in `scan_progress`.
const PHASE_HASH: &str = "hash";
const PHASE_PROBE: &str = "probe";

pub struct Orchestrator {
    db: SqlitePool,
    state: Arc<AgentState>,
    config_source: ConfigSource,
    scan_now: Arc<Notify>,
    drain_notify: Arc<Notify>,
    cancel: CancellationToken,
}

/// Per-cycle context shared by both passes.
struct Cycle {
    cfg: AgentConfig,
    classifier: Arc<Classifier>,
    cache: Arc<ReuseCache>,
    pool: Arc<PermitPool>,
    batch_tx: mpsc::Sender<BatchCommand>,
    algo: HashAlgo,
    checkpoint_every: u64,
}

impl Orchestrator {
    pub fn new(
        db: SqlitePool,
        state: Arc<AgentState>,
        config_source: ConfigSource,
        scan_now: Arc<Notify>,
        drain_notify: Arc<Notify>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            state,
            config_source,
            scan_now,
            drain_notify,
            cancel,
        }
    }

    /// Run scan cycles until shutdown. Never returns under normal
    /// operation.
    pub async fn run(self) {
        // Queued payloads from a previous run go out first.
        self.drain_notify.notify_one();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let cfg = match self.config_source.fetch_or_cached().await {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(error = %e, "No usable configuration yet, retrying");
                    if !self.idle_sleep(CYCLE_RETRY).await {
                        break;
                    }
                    continue;
                }
            };

            if cfg.remote_roots.is_empty() {
                tracing::info!("No remote roots configured on host, waiting");
                if !self.idle_sleep(NO_ROOTS_POLL).await {
                    break;
                }
                continue;
            }

            let uploaded_before = self.state.uploaded.load(Ordering::Relaxed);
            if let Err(e) = self.run_cycle(cfg).await {
                tracing::error!(error = %e, "Scan cycle failed");
                self.state.set_phase(ScanPhase::Idle);
                if !self.idle_sleep(CYCLE_RETRY).await {
                    break;
                }
                continue;
            }
            self.state.set_phase(ScanPhase::Idle);

            if self.cancel.is_cancelled() {
                break;
            }

            let uploaded = self.state.uploaded.load(Ordering::Relaxed) - uploaded_before;
            let sleep = if uploaded > 0 {
                CYCLE_SLEEP_PRODUCTIVE
            } else {
                CYCLE_SLEEP_EMPTY
            };
            tracing::info!(uploaded, sleep_s = sleep.as_secs(), "Cycle complete, idling");
            if !self.idle_sleep(sleep).await {
                break;
            }
        }

        self.state.set_phase(ScanPhase::Idle);
        tracing::info!("Orchestrator stopped");
    }

    /// Sleep until the duration elapses or `scan_now` fires. Returns
    /// false on shutdown.
    async fn idle_sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = self.scan_now.notified() => {
                tracing::info!("scan_now received, starting cycle");
                true
            }
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// One full two-pass cycle over every configured root.
    async fn run_cycle(&self, cfg: AgentConfig) -> Result<()> {
        let roots = cfg.remote_roots.clone();
        tracing::info!(roots = roots.len(), "Starting scan cycle");
        self.state.begin_cycle();

        // Pre-count totals for progress reporting.
        let video_exts: HashSet<String> = cfg
            .media_extensions
            .video
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        let count_roots = roots.clone();
        let follow = cfg.follow_symlinks;
        let (total, videos) = tokio::task::spawn_blocking(move || {
            scanner::count_files(&count_roots, follow, &video_exts)
        })
        .await
        .unwrap_or((0, 0));
        self.state.total_files.store(total, Ordering::Relaxed);
        self.state.total_videos.store(videos, Ordering::Relaxed);
        tracing::info!(total_files = total, video_files = videos, "Pre-count complete");

        // Per-cycle workers, tuner, and upload pipeline.
        let max_workers = cfg.agent_max_workers.max(1);
        let pool = PermitPool::new(max_workers, 1, max_workers);
        self.state
            .workers
            .store(pool.capacity() as u64, Ordering::Relaxed);
        let tuner_cancel = self.cancel.child_token();
        let tuner = tokio::spawn(permits::run_tuner(
            Arc::clone(&pool),
            Arc::clone(&self.state),
            cfg.agent_adaptive,
            tuner_cancel.clone(),
        ));

        let uploader = Arc::new(Uploader::new(
            self.config_source.host_base().to_string(),
            self.db.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.drain_notify),
            cfg.agent_gzip,
        )?);
        let (batch_tx, batch_rx) = mpsc::channel(1024);
        let batcher = tokio::spawn(run_batcher(
            batch_rx,
            Arc::clone(&uploader),
            cfg.agent_batch_size,
            self.cancel.clone(),
        ));

        let cycle = Cycle {
            algo: HashAlgo::parse(&cfg.hash_algo),
            checkpoint_every: (cfg.agent_batch_size as u64).min(500).max(1),
            classifier: Arc::new(Classifier::from_config(&cfg)),
            cache: Arc::new(ReuseCache::new(self.db.clone())),
            pool: Arc::clone(&pool),
            batch_tx,
            cfg,
        };

        // Pass 1: hash everything.
        self.state.set_phase(ScanPhase::Hash);
        for root in &roots {
            if self.cancel.is_cancelled() {
                break;
            }
            tracing::info!(root = %root, "Pass 1 (hash) scanning root");
            self.scan_root(root, ScanPhase::Hash, &cycle).await;
        }
        flush_batches(&cycle.batch_tx).await;

        // Pass 2: probe videos. All Pass 1 batches are sealed before any
        // Pass 2 record is emitted.
        if !self.cancel.is_cancelled() {
            if prober::ffprobe_available().await {
                self.state.set_phase(ScanPhase::Probe);
                for root in &roots {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    tracing::info!(root = %root, "Pass 2 (probe) scanning root");
                    self.scan_root(root, ScanPhase::Probe, &cycle).await;
                }
                flush_batches(&cycle.batch_tx).await;
            } else {
                tracing::warn!("ffprobe not available, skipping probe pass");
            }
        }

        // Teardown: stop the tuner, let the batcher drain, retire the
        // worker pool.
        tuner_cancel.cancel();
        drop(cycle);
        if let Err(e) = batcher.await {
            tracing::error!(error = %e, "Batcher task failed");
        }
        if let Err(e) = tuner.await {
            tracing::error!(error = %e, "Tuner task failed");
        }
        pool.close();

        Ok(())
    }

    /// Scan one root for one phase, dispatching permit-bounded work and
    /// checkpointing the cursor as enumeration advances.
    async fn scan_root(&self, root: &str, phase: ScanPhase, cycle: &Cycle) {
        let phase_name = match phase {
            ScanPhase::Hash => PHASE_HASH,
            ScanPhase::Probe => PHASE_PROBE,
            ScanPhase::Idle => return,
        };

        let cursor = match progress::get(&self.db, root, phase_name).await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::warn!(root = %root, error = %e, "Cursor load failed, scanning from start");
                None
            }
        };
        if let Some(cursor) = &cursor {
            tracing::info!(root = %root, cursor = %cursor, "Resuming from cursor");
        }
        let mut cursor_high = cursor.clone().unwrap_or_default();

        let mut rx = scanner::spawn_walk(
            root.into(),
            cycle.cfg.follow_symlinks,
            cursor,
            self.cancel.clone(),
        );

        let mut tasks: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();
        let mut enumerated = 0u64;

        while let Some(entry) = rx.recv().await {
            if self.cancel.is_cancelled() {
                break;
            }

            // Reap finished work without blocking enumeration.
            while let Some(Some(result)) = tasks.next().now_or_never() {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Worker task panicked");
                    self.state.errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            self.state.seen.fetch_add(1, Ordering::Relaxed);
            enumerated += 1;

            // Checkpoint the cursor at least once per batch worth of
            // enumeration.
            let path_str = entry.path.to_string_lossy().into_owned();
            if enumerated % cycle.checkpoint_every == 0 {
                checkpoint_cursor(&self.db, root, phase_name, &path_str, &mut cursor_high).await;
            }

            let spawned = match phase {
                ScanPhase::Hash => self.dispatch_hash(entry, path_str, cycle).await,
                ScanPhase::Probe => self.dispatch_probe(entry, path_str, cycle).await,
                ScanPhase::Idle => None,
            };
            if let Some(handle) = spawned {
                tasks.push(handle);
            }
        }

        // Let in-flight work finish; bounded grace on shutdown.
        let drain = async {
            while let Some(result) = tasks.next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Worker task panicked");
                    self.state.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        };
        if self.cancel.is_cancelled() {
            if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
                tracing::warn!("Shutdown grace elapsed with tasks still running");
            }
            return;
        }
        drain.await;

        // Root finished its phase cleanly; next cycle starts fresh.
        if let Err(e) = progress::clear(&self.db, root, phase_name).await {
            tracing::warn!(root = %root, error = %e, "Cursor clear failed");
        }
        tracing::info!(root = %root, phase = phase_name, enumerated, "Root phase complete");
    }

    /// Pass 1 handling for one enumerated file. Returns the handle of
    /// spawned hash work, if any.
    async fn dispatch_hash(
        &self,
        entry: ScanEntry,
        path_str: String,
        cycle: &Cycle,
    ) -> Option<JoinHandle<()>> {
        let classification = cycle.classifier.classify(&entry.file_name, &entry.ext);
        self.state.record_kind(classification.kind);

        // Junk uploads immediately: reason, no fingerprints, no cache.
        if classification.kind == FileKind::Junk {
            let mut record = base_record(&entry, path_str, FileKind::Junk);
            record.reason = classification.reason;
            send_record(&cycle.batch_tx, record).await;
            return None;
        }

        // Read the cached row before touch overwrites its inode_key:
        // freshness compares the previous observation against this one.
        let cached = cycle.cache.lookup(&path_str).await;
        cycle
            .cache
            .touch(
                &path_str,
                &entry.inode_key,
                entry.size as i64,
                entry.mtime,
                entry.ctime,
                now_epoch(),
            )
            .await;

        // Fresh cached hashes are re-emitted without recomputation.
        let sample_size = cycle.cfg.hash_sample_size;
        if let Some(cached) = cached {
            if let Some(hashes) =
                cached.cached_hashes(&entry.inode_key, cycle.algo.as_str(), sample_size)
            {
                let mut record = base_record(&entry, path_str, classification.kind);
                record.hashes = Some(hashes);
                send_record(&cycle.batch_tx, record).await;
                return None;
            }
        }

        // Full hashing only inside the off-peak window; samples always.
        let do_full = cycle.cfg.do_full_hash
            && in_offpeak(
                Local::now().hour(),
                cycle.cfg.agent_offpeak_start,
                cycle.cfg.agent_offpeak_end,
            );

        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            permit = cycle.pool.acquire() => permit?,
        };

        let state = Arc::clone(&self.state);
        let cache = Arc::clone(&cycle.cache);
        let batch_tx = cycle.batch_tx.clone();
        let algo = cycle.algo;
        let kind = classification.kind;

        Some(tokio::spawn(async move {
            let _permit = permit;
            let t0 = Instant::now();
            let mut record = base_record(&entry, path_str.clone(), kind);

            let hash_path = entry.path.clone();
            let result = tokio::task::spawn_blocking(move || {
                hasher::hash_file(&hash_path, algo, sample_size, do_full)
            })
            .await;

            match result {
                Ok(Ok((sample_hash, full_hash))) => {
                    cache
                        .mark_hashed(
                            &path_str,
                            algo.as_str(),
                            sample_size,
                            &sample_hash,
                            full_hash.as_deref(),
                            now_epoch(),
                        )
                        .await;
                    record.hashes = Some(FileHashes {
                        algo: algo.as_str().to_string(),
                        sample_size,
                        sample_hash,
                        full_hash,
                    });
                }
                Ok(Err(e)) => {
                    // Un-hashable files still report their existence.
                    tracing::warn!(path = %path_str, error = %e, "Hashing failed");
                    state.errors.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::error!(path = %path_str, error = %e, "Hash task failed");
                    state.errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            send_record(&batch_tx, record).await;
            state.record_task_latency(t0.elapsed());
        }))
    }

    /// Pass 2 handling for one enumerated file. Only videos are
    /// processed; an already-probed inode emits nothing. Returns the
    /// handle of spawned probe work, if any.
    async fn dispatch_probe(
        &self,
        entry: ScanEntry,
        path_str: String,
        cycle: &Cycle,
    ) -> Option<JoinHandle<()>> {
        let classification = cycle.classifier.classify(&entry.file_name, &entry.ext);
        if classification.kind != FileKind::Video {
            return None;
        }

        // As in the hash pass, consult the previous observation before
        // touch replaces it.
        let cached = cycle.cache.lookup(&path_str).await;
        cycle
            .cache
            .touch(
                &path_str,
                &entry.inode_key,
                entry.size as i64,
                entry.mtime,
                entry.ctime,
                now_epoch(),
            )
            .await;

        if let Some(cached) = cached {
            if cached.probe_fresh(&entry.inode_key) {
                return None;
            }
        }

        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            permit = cycle.pool.acquire() => permit?,
        };

        let state = Arc::clone(&self.state);
        let cache = Arc::clone(&cycle.cache);
        let batch_tx = cycle.batch_tx.clone();

        Some(tokio::spawn(async move {
            let _permit = permit;
            let t0 = Instant::now();

            match prober::probe(&entry.path).await {
                Ok(meta) => {
                    cache.mark_probed(&path_str).await;
                    let mut record = base_record(&entry, path_str, FileKind::Video);
                    record.video_meta = Some(meta);
                    send_record(&batch_tx, record).await;
                }
                Err(e) => {
                    tracing::warn!(path = %path_str, error = %e, "Probe failed");
                    state.errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            state.record_task_latency(t0.elapsed());
        }))
    }
}

/// Persist a cursor checkpoint when the candidate has advanced past the
/// stored position. Enumeration order and string order can disagree
/// around name-prefix boundaries (a directory `a/` descends before a
/// sibling file `a.txt`, yet `'.' < '/'`), so a stored cursor only ever
/// moves forward lexicographically.
async fn checkpoint_cursor(
    db: &SqlitePool,
    root: &str,
    phase_name: &str,
    candidate: &str,
    cursor_high: &mut String,
) {
    if candidate <= cursor_high.as_str() {
        return;
    }
    match progress::set(db, root, phase_name, candidate, now_epoch()).await {
        Ok(()) => *cursor_high = candidate.to_string(),
        Err(e) => {
            tracing::warn!(root = %root, error = %e, "Cursor checkpoint failed");
        }
    }
}

/// Wire record carrying the stat snapshot; sub-objects filled by the
/// caller.
fn base_record(entry: &ScanEntry, path: String, kind: FileKind) -> FileRecord {
    FileRecord {
        kind,
        path,
        size: entry.size,
        mtime: entry.mtime,
        ctime: entry.ctime,
        inode_key: entry.inode_key.clone(),
        ext: entry.ext.clone(),
        reason: None,
        hashes: None,
        video_meta: None,
    }
}

async fn send_record(tx: &mpsc::Sender<BatchCommand>, record: FileRecord) {
    if tx.send(BatchCommand::Record(record)).await.is_err() {
        tracing::warn!("Batcher gone, dropping record");
    }
}

/// Seal whatever is buffered and wait for the upload attempt.
async fn flush_batches(tx: &mpsc::Sender<BatchCommand>) {
    let (ack_tx, ack_rx) = oneshot::channel();
    if tx.send(BatchCommand::Flush(ack_tx)).await.is_ok() {
        let _ = ack_rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{index, open_memory_pool};
    use tempfile::TempDir;

    #[tokio::test]
    async fn checkpoint_guard_never_regresses_cursor() {
        let pool = open_memory_pool().await;
        let mut cursor_high = String::new();

        // In-place DFS descends into `a/` before reaching the sibling
        // file `a.txt`, so `/r/a/x.mkv` is enumerated first even though
        // `/r/a.txt` sorts before it as a string.
        checkpoint_cursor(&pool, "/r", PHASE_HASH, "/r/a/x.mkv", &mut cursor_high).await;
        assert_eq!(
            progress::get(&pool, "/r", PHASE_HASH).await.unwrap().as_deref(),
            Some("/r/a/x.mkv")
        );

        // The lexicographically earlier candidate must not move the
        // stored cursor backward.
        checkpoint_cursor(&pool, "/r", PHASE_HASH, "/r/a.txt", &mut cursor_high).await;
        assert_eq!(
            progress::get(&pool, "/r", PHASE_HASH).await.unwrap().as_deref(),
            Some("/r/a/x.mkv")
        );
        assert_eq!(cursor_high, "/r/a/x.mkv");

        // A genuinely later path advances it again.
        checkpoint_cursor(&pool, "/r", PHASE_HASH, "/r/b.mkv", &mut cursor_high).await;
        assert_eq!(
            progress::get(&pool, "/r", PHASE_HASH).await.unwrap().as_deref(),
            Some("/r/b.mkv")
        );
    }

    #[tokio::test]
    async fn checkpoint_guard_holds_against_a_resumed_cursor() {
        let pool = open_memory_pool().await;
        progress::set(&pool, "/r", PHASE_PROBE, "/r/m.mkv", 1.0)
            .await
            .unwrap();
        let mut cursor_high = "/r/m.mkv".to_string();

        // Nothing at or before the resume point may overwrite it.
        checkpoint_cursor(&pool, "/r", PHASE_PROBE, "/r/a.mkv", &mut cursor_high).await;
        checkpoint_cursor(&pool, "/r", PHASE_PROBE, "/r/m.mkv", &mut cursor_high).await;
        assert_eq!(
            progress::get(&pool, "/r", PHASE_PROBE).await.unwrap().as_deref(),
            Some("/r/m.mkv")
        );

        checkpoint_cursor(&pool, "/r", PHASE_PROBE, "/r/z.mkv", &mut cursor_high).await;
        assert_eq!(
            progress::get(&pool, "/r", PHASE_PROBE).await.unwrap().as_deref(),
            Some("/r/z.mkv")
        );
        assert_eq!(cursor_high, "/r/z.mkv");
    }

    fn test_orchestrator(pool: &SqlitePool) -> (Orchestrator, Arc<AgentState>) {
        let state = Arc::new(AgentState::new());
        let orchestrator = Orchestrator::new(
            pool.clone(),
            Arc::clone(&state),
            ConfigSource::new("http://127.0.0.1:1".to_string(), pool.clone()).unwrap(),
            Arc::new(Notify::new()),
            Arc::new(Notify::new()),
            CancellationToken::new(),
        );
        (orchestrator, state)
    }

    fn test_cycle(pool: &SqlitePool, batch_tx: mpsc::Sender<BatchCommand>) -> Cycle {
        let cfg = AgentConfig::default();
        Cycle {
            algo: HashAlgo::Sha256,
            checkpoint_every: 1,
            classifier: Arc::new(Classifier::from_config(&cfg)),
            cache: Arc::new(ReuseCache::new(pool.clone())),
            pool: PermitPool::new(2, 1, 2),
            batch_tx,
            cfg,
        }
    }

    #[tokio::test]
    async fn pass_two_skips_already_probed_video() {
        let pool = open_memory_pool().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v.mkv");
        std::fs::write(&path, vec![0x1Au8; 2048]).unwrap();
        let entry = scanner::stat_entry(&path).unwrap();
        let path_str = path.to_string_lossy().into_owned();

        // A previous cycle probed this exact storage object.
        index::touch(
            &pool,
            &path_str,
            &entry.inode_key,
            entry.size as i64,
            entry.mtime,
            entry.ctime,
            1.0,
        )
        .await
        .unwrap();
        index::mark_probed(&pool, &path_str).await.unwrap();

        let (orchestrator, state) = test_orchestrator(&pool);
        let (tx, mut rx) = mpsc::channel(8);
        let cycle = test_cycle(&pool, tx);

        // probed=true with a matching inode: no work spawned, nothing
        // emitted.
        let spawned = orchestrator.dispatch_probe(entry, path_str, &cycle).await;
        assert!(spawned.is_none());

        drop(cycle);
        assert!(rx.recv().await.is_none());
        assert_eq!(state.errors.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn replaced_video_is_probed_again() {
        let pool = open_memory_pool().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v.mkv");
        std::fs::write(&path, vec![0x1Au8; 2048]).unwrap();
        let entry = scanner::stat_entry(&path).unwrap();
        let path_str = path.to_string_lossy().into_owned();

        // The cached probe belongs to a different storage object.
        index::touch(&pool, &path_str, "0:0", 1, 1.0, 1.0, 1.0)
            .await
            .unwrap();
        index::mark_probed(&pool, &path_str).await.unwrap();

        let (orchestrator, state) = test_orchestrator(&pool);
        let (tx, mut rx) = mpsc::channel(8);
        let cycle = test_cycle(&pool, tx);

        // Mismatched inode invalidates the cached probe, so work is
        // dispatched. The file is not a real video, so whatever prober
        // this machine has fails and no record goes out.
        let spawned = orchestrator.dispatch_probe(entry, path_str, &cycle).await;
        let handle = spawned.expect("stale probe state must dispatch work");
        handle.await.unwrap();

        drop(cycle);
        assert!(rx.recv().await.is_none());
        assert_eq!(state.errors.load(Ordering::Relaxed), 1);
    }
}
