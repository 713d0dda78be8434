//! Bounded persistence queue
//!
//! Each workspace owns one queue in front of its persistence worker. A pass
//! snapshots the replica when it starts, so requests arriving while one is
//! already queued carry no extra information: a full queue coalesces them
//! instead of growing.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// What happened to a persistence request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Queued,
    /// A pass is already pending and will see the latest state
    Coalesced,
    /// The worker has shut down
    Closed,
}

/// Counters kept per workspace persistence worker
#[derive(Debug, Default)]
pub struct PersistenceStats {
    runs: AtomicU64,
    writes: AtomicU64,
    failures: AtomicU64,
    coalesced: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time copy of [`PersistenceStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceStatsSnapshot {
    pub runs: u64,
    pub writes: u64,
    pub failures: u64,
    pub coalesced: u64,
    pub last_error: Option<String>,
}

impl PersistenceStats {
    pub fn record_success(&self, writes: usize) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.writes.fetch_add(writes as u64, Ordering::Relaxed);
        *self.last_error.lock() = None;
    }

    pub fn record_failure(&self, error: impl ToString) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PersistenceStatsSnapshot {
        PersistenceStatsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Sending half of a workspace persistence queue
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    sender: mpsc::Sender<()>,
    stats: Arc<PersistenceStats>,
}

impl PersistenceQueue {
    /// Create a queue holding at most `depth` pending passes
    pub fn bounded(depth: usize) -> (Self, mpsc::Receiver<()>) {
        let (sender, receiver) = mpsc::channel(depth.max(1));
        let queue = Self {
            sender,
            stats: Arc::new(PersistenceStats::default()),
        };
        (queue, receiver)
    }

    /// Request a persistence pass
    pub fn schedule(&self) -> ScheduleOutcome {
        match self.sender.try_send(()) {
            Ok(()) => ScheduleOutcome::Queued,
            Err(TrySendError::Full(())) => {
                self.stats.record_coalesced();
                ScheduleOutcome::Coalesced
            }
            Err(TrySendError::Closed(())) => ScheduleOutcome::Closed,
        }
    }

    pub fn stats(&self) -> &Arc<PersistenceStats> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_queue_coalesces() {
        let (queue, mut receiver) = PersistenceQueue::bounded(1);

        assert_eq!(queue.schedule(), ScheduleOutcome::Queued);
        assert_eq!(queue.schedule(), ScheduleOutcome::Coalesced);
        assert_eq!(queue.schedule(), ScheduleOutcome::Coalesced);
        assert_eq!(queue.stats().snapshot().coalesced, 2);

        receiver.recv().await.unwrap();
        assert_eq!(queue.schedule(), ScheduleOutcome::Queued);
    }

    #[tokio::test]
    async fn test_closed_worker() {
        let (queue, receiver) = PersistenceQueue::bounded(4);
        drop(receiver);
        assert_eq!(queue.schedule(), ScheduleOutcome::Closed);
    }

    #[test]
    fn test_stats_track_last_error() {
        let stats = PersistenceStats::default();
        stats.record_failure("db down");
        assert_eq!(stats.snapshot().last_error.as_deref(), Some("db down"));

        stats.record_success(3);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.runs, 2);
        assert_eq!(snapshot.writes, 3);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.last_error, None);
    }
}
