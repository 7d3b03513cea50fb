//! Scheduler metrics
//!
//! Lock-free counters updated on the producer thread and the runtime
//! completion threads, with a serializable snapshot for logs and the
//! benchmark driver.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Core scheduler counters
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    submitted: AtomicU64,
    consumed: AtomicU64,
    batches_launched: AtomicU64,
    partial_batches: AtomicU64,
    preproc_failures: AtomicU64,
    postproc_failures: AtomicU64,
    launch_failures: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_launched(&self, fill: usize, batch_size: usize) {
        self.batches_launched.fetch_add(1, Ordering::Relaxed);
        if fill < batch_size {
            self.partial_batches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_preproc_failure(&self) {
        self.preproc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_postproc_failure(&self) {
        self.postproc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_launch_failure(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            batches_launched: self.batches_launched.load(Ordering::Relaxed),
            partial_batches: self.partial_batches.load(Ordering::Relaxed),
            preproc_failures: self.preproc_failures.load(Ordering::Relaxed),
            postproc_failures: self.postproc_failures.load(Ordering::Relaxed),
            launch_failures: self.launch_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub consumed: u64,
    pub batches_launched: u64,
    pub partial_batches: u64,
    pub preproc_failures: u64,
    pub postproc_failures: u64,
    pub launch_failures: u64,
}
