use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters for a send queue
#[derive(Debug, Default)]
pub struct QueueMetrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    groups_created: AtomicU64,
    groups_cancelled: AtomicU64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A panic also counts as a failure
    pub fn increment_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
        self.increment_failed();
    }

    pub fn increment_groups_created(&self) {
        self.groups_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_groups_cancelled(&self) {
        self.groups_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            groups_created: self.groups_created.load(Ordering::Relaxed),
            groups_cancelled: self.groups_cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`QueueMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    pub groups_created: u64,
    pub groups_cancelled: u64,
}

impl MetricsSnapshot {
    /// Submissions accepted but not yet finished
    pub fn outstanding(&self) -> u64 {
        self.accepted.saturating_sub(self.succeeded + self.failed)
    }
}
