//! Adaptive worker permit pool
//!
//! A counting semaphore whose capacity can be resized at runtime within
//! `[min_workers, max_workers]`. Every hash or probe task holds one
//! permit for its duration. Growing adds a permit immediately; shrinking
//! retires one permit, waiting out an in-flight task if necessary, so
//! capacity changes take effect on the next acquire.
//!
//! A tuner task evaluates the rule every 5 seconds: shrink when the
//! outbox is backed up or uploads are failing, grow when tasks are fast
//! and nothing is queued.

use crate::state::AgentState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Tuner evaluation interval.
pub const TUNE_INTERVAL: Duration = Duration::from_secs(5);

/// Outbox depth above which capacity is reduced.
pub const OUTBOX_HIGH_WATERMARK: u64 = 8;

/// Upload error rate above which capacity is reduced.
pub const ERROR_RATE_LIMIT: f64 = 0.10;

/// Mean task latency below which capacity may grow.
pub const LATENCY_TARGET: Duration = Duration::from_millis(500);

pub struct PermitPool {
    sem: Arc<Semaphore>,
    capacity: AtomicUsize,
    min: usize,
    max: usize,
}

impl PermitPool {
    /// Pool starting at `initial` permits, resizable in `[min, max]`.
    pub fn new(initial: usize, min: usize, max: usize) -> Arc<Self> {
        let min = min.max(1);
        let max = max.max(min);
        let initial = initial.clamp(min, max);
        Arc::new(Self {
            sem: Arc::new(Semaphore::new(initial)),
            capacity: AtomicUsize::new(initial),
            min,
            max,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Acquire one permit, waiting for a free slot. Returns `None` only
    /// if the pool was closed for shutdown.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.sem).acquire_owned().await.ok()
    }

    /// Stop handing out permits; pending acquires return `None`.
    pub fn close(&self) {
        self.sem.close();
    }

    /// Raise capacity by one, up to the ceiling.
    pub fn grow(&self) -> bool {
        let cap = self.capacity.load(Ordering::Relaxed);
        if cap >= self.max {
            return false;
        }
        self.capacity.store(cap + 1, Ordering::Relaxed);
        self.sem.add_permits(1);
        true
    }

    /// Lower capacity by one, down to the floor. When all permits are in
    /// use the retirement happens as the next task finishes.
    pub fn shrink(self: &Arc<Self>) -> bool {
        let cap = self.capacity.load(Ordering::Relaxed);
        if cap <= self.min {
            return false;
        }
        self.capacity.store(cap - 1, Ordering::Relaxed);
        match self.sem.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(_) => {
                let sem = Arc::clone(&self.sem);
                tokio::spawn(async move {
                    if let Ok(permit) = sem.acquire_owned().await {
                        permit.forget();
                    }
                });
            }
        }
        true
    }
}

/// Full-file hashing is only allowed inside the off-peak window
/// `[start, end)` in local hours. A window wrapping midnight
/// (e.g. 22..3) is supported; `start == end` is an empty window.
pub fn in_offpeak(hour: u32, start: u32, end: u32) -> bool {
    if start == end {
        return false;
    }
    if start < end {
        start <= hour && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Run the adaptive tuner until cancelled. With adaptation disabled the
/// capacity stays pinned and only the stats mirror is refreshed.
pub async fn run_tuner(
    pool: Arc<PermitPool>,
    state: Arc<AgentState>,
    adaptive: bool,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(TUNE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        state
            .workers
            .store(pool.capacity() as u64, Ordering::Relaxed);

        if !adaptive {
            continue;
        }

        let window = state.take_window();
        let outbox = state.outbox_pending.load(Ordering::Relaxed);

        if outbox > OUTBOX_HIGH_WATERMARK || window.error_rate() > ERROR_RATE_LIMIT {
            if pool.shrink() {
                tracing::info!(
                    capacity = pool.capacity(),
                    outbox,
                    error_rate = window.error_rate(),
                    "Reduced worker capacity"
                );
            }
        } else if outbox == 0 {
            if let Some(mean) = window.mean_latency() {
                if mean < LATENCY_TARGET && pool.grow() {
                    tracing::info!(
                        capacity = pool.capacity(),
                        mean_latency_ms = mean.as_millis() as u64,
                        "Raised worker capacity"
                    );
                }
            }
        }

        state
            .workers
            .store(pool.capacity() as u64, Ordering::Relaxed);
    }
}
