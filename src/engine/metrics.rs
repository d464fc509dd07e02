use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Command counters. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct MetricsTracker {
    requested: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
    ended: Arc<AtomicU64>,
    canceled: Arc<AtomicU64>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_requested(&self) {
        self.requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A command reached END or was evicted after COMPLETE
    pub fn record_ended(&self) {
        self.ended.fetch_add(1, Ordering::Relaxed);
    }

    /// A command entered CANCELING, requested or self-initiated
    pub fn record_canceled(&self) {
        self.canceled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requested: self.requested.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            ended: self.ended.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requested: u64,
    pub rejected: u64,
    pub ended: u64,
    pub canceled: u64,
}
