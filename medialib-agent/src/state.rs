//! Shared agent state
//!
//! One owned `AgentState` is created at startup and handed by `Arc` to the
//! orchestrator, the uploader, the adaptive tuner, and the control API.
//! Counters are atomics; the scan phase and window live behind locks that
//! are never held across an await.

use medialib_common::records::FileKind;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Current orchestrator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Idle,
    Hash,
    Probe,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Hash => "hash",
            ScanPhase::Probe => "probe",
        }
    }
}

/// Sliding window of upload and task measurements consumed by the
/// adaptive tuner. Reset on every evaluation.
#[derive(Debug, Default, Clone)]
pub struct StatsWindow {
    pub upload_ok: u64,
    pub upload_err: u64,
    pub task_count: u64,
    pub task_latency: Duration,
}

impl StatsWindow {
    /// Upload error rate over the window; 0 when nothing was uploaded.
    pub fn error_rate(&self) -> f64 {
        let total = self.upload_ok + self.upload_err;
        if total == 0 {
            return 0.0;
        }
        self.upload_err as f64 / total as f64
    }

    /// Mean per-task latency over the window, if any tasks completed.
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.task_count == 0 {
            return None;
        }
        Some(self.task_latency / self.task_count as u32)
    }
}

/// Shared mutable agent state. No ambient globals; everything observable
/// by `/agent/stats` lives here.
pub struct AgentState {
    /// Whether a scan pass is currently executing.
    pub active: AtomicBool,
    phase: RwLock<ScanPhase>,

    /// Files enumerated in the current cycle.
    pub seen: AtomicU64,
    /// Records accepted by the host.
    pub uploaded: AtomicU64,
    /// Batches accepted by the host.
    pub batches: AtomicU64,
    /// Recovered per-file and transport errors.
    pub errors: AtomicU64,

    /// Pre-counted totals for the current cycle.
    pub total_files: AtomicU64,
    pub total_videos: AtomicU64,

    /// Items currently queued in the outbox.
    pub outbox_pending: AtomicU64,
    /// Current permit pool capacity.
    pub workers: AtomicU64,

    // Per-kind counters for the current cycle.
    pub kind_video: AtomicU64,
    pub kind_image: AtomicU64,
    pub kind_subtitle: AtomicU64,
    pub kind_xml: AtomicU64,
    pub kind_other: AtomicU64,
    pub kind_junk: AtomicU64,

    scan_started: RwLock<Option<Instant>>,
    window: Mutex<StatsWindow>,
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            phase: RwLock::new(ScanPhase::Idle),
            seen: AtomicU64::new(0),
            uploaded: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_files: AtomicU64::new(0),
            total_videos: AtomicU64::new(0),
            outbox_pending: AtomicU64::new(0),
            workers: AtomicU64::new(0),
            kind_video: AtomicU64::new(0),
            kind_image: AtomicU64::new(0),
            kind_subtitle: AtomicU64::new(0),
            kind_xml: AtomicU64::new(0),
            kind_other: AtomicU64::new(0),
            kind_junk: AtomicU64::new(0),
            scan_started: RwLock::new(None),
            window: Mutex::new(StatsWindow::default()),
        }
    }

    pub fn phase(&self) -> ScanPhase {
        *self.phase.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_phase(&self, phase: ScanPhase) {
        *self.phase.write().unwrap_or_else(|e| e.into_inner()) = phase;
        self.active
            .store(phase != ScanPhase::Idle, Ordering::Relaxed);
    }

    /// Mark the start of a scan cycle, resetting the per-cycle counters.
    pub fn begin_cycle(&self) {
        self.seen.store(0, Ordering::Relaxed);
        self.kind_video.store(0, Ordering::Relaxed);
        self.kind_image.store(0, Ordering::Relaxed);
        self.kind_subtitle.store(0, Ordering::Relaxed);
        self.kind_xml.store(0, Ordering::Relaxed);
        self.kind_other.store(0, Ordering::Relaxed);
        self.kind_junk.store(0, Ordering::Relaxed);
        *self
            .scan_started
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    pub fn record_kind(&self, kind: FileKind) {
        let counter = match kind {
            FileKind::Video => &self.kind_video,
            FileKind::Image => &self.kind_image,
            FileKind::Subtitle => &self.kind_subtitle,
            FileKind::Xml => &self.kind_xml,
            FileKind::Other => &self.kind_other,
            FileKind::Junk => &self.kind_junk,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, ok: bool) {
        let mut w = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if ok {
            w.upload_ok += 1;
        } else {
            w.upload_err += 1;
        }
    }

    pub fn record_task_latency(&self, latency: Duration) {
        let mut w = self.window.lock().unwrap_or_else(|e| e.into_inner());
        w.task_count += 1;
        w.task_latency += latency;
    }

    /// Take and reset the adaptive window.
    pub fn take_window(&self) -> StatsWindow {
        std::mem::take(&mut *self.window.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Uploaded records per second since the current cycle began.
    pub fn rate_files_per_s(&self) -> f64 {
        let started = *self.scan_started.read().unwrap_or_else(|e| e.into_inner());
        match started {
            Some(t0) => {
                let elapsed = t0.elapsed().as_secs_f64().max(0.0001);
                self.uploaded.load(Ordering::Relaxed) as f64 / elapsed
            }
            None => 0.0,
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions_update_active() {
        let state = AgentState::new();
        assert_eq!(state.phase(), ScanPhase::Idle);
        assert!(!state.active.load(Ordering::Relaxed));

        state.set_phase(ScanPhase::Hash);
        assert_eq!(state.phase(), ScanPhase::Hash);
        assert!(state.active.load(Ordering::Relaxed));

        state.set_phase(ScanPhase::Idle);
        assert!(!state.active.load(Ordering::Relaxed));
    }

    #[test]
    fn window_error_rate() {
        let state = AgentState::new();
        state.record_upload(true);
        state.record_upload(true);
        state.record_upload(false);
        let w = state.take_window();
        assert!((w.error_rate() - 1.0 / 3.0).abs() < 1e-9);
        // Window resets after take.
        assert_eq!(state.take_window().upload_ok, 0);
    }

    #[test]
    fn window_mean_latency() {
        let state = AgentState::new();
        assert!(state.take_window().mean_latency().is_none());
        state.record_task_latency(Duration::from_millis(100));
        state.record_task_latency(Duration::from_millis(300));
        let mean = state.take_window().mean_latency().unwrap();
        assert_eq!(mean, Duration::from_millis(200));
    }

    #[test]
    fn begin_cycle_resets_kind_counters() {
        let state = AgentState::new();
        state.record_kind(FileKind::Video);
        state.record_kind(FileKind::Junk);
        assert_eq!(state.kind_video.load(Ordering::Relaxed), 1);
        state.begin_cycle();
        assert_eq!(state.kind_video.load(Ordering::Relaxed), 0);
        assert_eq!(state.kind_junk.load(Ordering::Relaxed), 0);
    }
}
