//! Shared storage metrics.
//!
//! One [`StorageMetrics`] instance is shared (via `Arc`) by the WAL, the
//! buffer pool, and the checkpoint manager. All counters are atomics so
//! the checkpoint policy thread can read them without taking any lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Lock-free metrics for the storage core.
#[derive(Debug, Default)]
pub struct StorageMetrics {
    /// Number of completed checkpoints.
    pub checkpoint_count: AtomicU64,
    /// Total time spent in checkpoints, in microseconds.
    pub total_checkpoint_us: AtomicU64,
    /// Total pages written by checkpoints.
    pub pages_written: AtomicU64,
    /// Checkpoints forced by a resource trigger (WAL size or dirty limits).
    pub forced_count: AtomicU64,
    /// Checkpoints that blocked writers (hard dirty limit).
    pub blocking_count: AtomicU64,
    /// Current total WAL size in bytes, published by the WAL.
    pub wal_size: AtomicU64,
    /// Current number of dirty pages, published by the buffer pool.
    pub dirty_pages: AtomicUsize,
}

impl StorageMetrics {
    /// Creates a fresh metrics bundle with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed checkpoint.
    pub fn record_checkpoint(
        &self,
        duration: Duration,
        pages: usize,
        forced: bool,
        blocking: bool,
    ) {
        self.checkpoint_count.fetch_add(1, Ordering::Relaxed);
        self.total_checkpoint_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.pages_written.fetch_add(pages as u64, Ordering::Relaxed);

        if forced {
            self.forced_count.fetch_add(1, Ordering::Relaxed);
        }
        if blocking {
            self.blocking_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the average checkpoint duration, or zero if none have run.
    pub fn average_checkpoint_duration(&self) -> Duration {
        let count = self.checkpoint_count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_checkpoint_us.load(Ordering::Relaxed) / count)
    }

    /// Number of completed checkpoints.
    pub fn checkpoints(&self) -> u64 {
        self.checkpoint_count.load(Ordering::Relaxed)
    }

    /// Number of checkpoints that blocked writers.
    pub fn blocking_checkpoints(&self) -> u64 {
        self.blocking_count.load(Ordering::Relaxed)
    }

    /// Current WAL size in bytes.
    pub fn wal_size(&self) -> u64 {
        self.wal_size.load(Ordering::Relaxed)
    }

    /// Current dirty page count.
    pub fn dirty_pages(&self) -> usize {
        self.dirty_pages.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_checkpoint() {
        let metrics = StorageMetrics::new();
        assert_eq!(metrics.checkpoints(), 0);
        assert_eq!(metrics.average_checkpoint_duration(), Duration::ZERO);

        metrics.record_checkpoint(Duration::from_micros(100), 10, false, false);
        metrics.record_checkpoint(Duration::from_micros(300), 20, true, true);

        assert_eq!(metrics.checkpoints(), 2);
        assert_eq!(metrics.pages_written.load(Ordering::Relaxed), 30);
        assert_eq!(metrics.forced_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.blocking_checkpoints(), 1);
        assert_eq!(
            metrics.average_checkpoint_duration(),
            Duration::from_micros(200)
        );
    }

    #[test]
    fn test_published_gauges() {
        let metrics = StorageMetrics::new();
        metrics.wal_size.store(1024, Ordering::Relaxed);
        metrics.dirty_pages.store(7, Ordering::Relaxed);

        assert_eq!(metrics.wal_size(), 1024);
        assert_eq!(metrics.dirty_pages(), 7);
    }
}
