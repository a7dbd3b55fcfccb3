//! Checkpoint manager.
//!
//! A background thread keeps the amount of dirty memory and WAL volume
//! bounded. Under normal load checkpoints never block writers; once the
//! hard dirty limit is reached, writers are held on a condition
//! variable until the flush brings the pool back under control.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use strata_common::metrics::StorageMetrics;
use strata_storage::buffer::BufferPool;
use strata_wal::wal::WriteAheadLog;

use crate::config::CheckpointConfig;
use crate::error::{EngineError, EngineResult};

/// Why a checkpoint was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTrigger {
    /// Periodic timer elapsed.
    Timer,
    /// WAL grew past its size threshold.
    WalSize,
    /// Soft dirty limit reached; throttled background flush.
    DirtySoft,
    /// Hard dirty limit reached; writers are blocked for the duration.
    DirtyHard,
    /// Explicit request.
    Manual,
    /// Final checkpoint during shutdown.
    Shutdown,
}

impl CheckpointTrigger {
    /// Returns true for triggers caused by resource pressure rather
    /// than time or an explicit request.
    fn is_forced(self) -> bool {
        !matches!(self, Self::Timer | Self::Manual)
    }
}

impl fmt::Display for CheckpointTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timer => "timer",
            Self::WalSize => "wal_size",
            Self::DirtySoft => "dirty_soft",
            Self::DirtyHard => "dirty_hard",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        };
        write!(f, "{name}")
    }
}

/// How often the background loop re-evaluates the triggers.
const TICK: Duration = Duration::from_secs(1);

/// State shared between the manager, the background thread, and
/// blocked writers.
struct CheckpointWorker {
    config: CheckpointConfig,
    buffer_pool: Arc<BufferPool>,
    wal: Arc<WriteAheadLog>,
    metrics: Arc<StorageMetrics>,

    /// Background loop keeps going while this is set.
    running: AtomicBool,
    /// Set while a stop is underway; aborts in-flight flush loops.
    stop_requested: AtomicBool,
    /// A manual checkpoint has been requested.
    requested: AtomicBool,
    /// Writers must wait while this is set.
    blocking: AtomicBool,

    /// Wakes the background thread early (manual request, stop).
    wake_lock: Mutex<()>,
    wake_cv: Condvar,

    /// Parks writers during a hard-limit checkpoint.
    block_lock: Mutex<()>,
    block_cv: Condvar,

    /// When the last checkpoint finished.
    last_checkpoint: Mutex<Instant>,
    /// Serializes checkpoint bodies: manual, background, and shutdown
    /// requests never interleave.
    checkpoint_lock: Mutex<()>,
}

impl CheckpointWorker {
    /// The background loop: wait for a signal or the next tick, then
    /// act on manual requests and automatic triggers.
    fn background_loop(&self) {
        while self.running.load(Ordering::Acquire) {
            {
                let mut guard = self.wake_lock.lock();
                if self.running.load(Ordering::Relaxed) && !self.requested.load(Ordering::Relaxed)
                {
                    self.wake_cv.wait_for(&mut guard, TICK);
                }
            }

            if !self.running.load(Ordering::Acquire) {
                break;
            }

            let trigger = if self.requested.swap(false, Ordering::AcqRel) {
                Some(CheckpointTrigger::Manual)
            } else {
                self.should_checkpoint()
            };

            if let Some(trigger) = trigger {
                if let Err(err) = self.do_checkpoint(trigger) {
                    warn!(%trigger, %err, "background checkpoint failed");
                }
            }
        }
    }

    /// Evaluates the trigger ladder, highest priority first.
    fn should_checkpoint(&self) -> Option<CheckpointTrigger> {
        let since_last = self.last_checkpoint.lock().elapsed();

        let dirty = self.buffer_pool.dirty_count();
        let capacity = self.buffer_pool.capacity();
        let dirty_ratio = dirty as f64 / capacity as f64;
        let wal_size = self.wal.size();

        // The hard limit bypasses the minimum-interval floor.
        if dirty_ratio >= self.config.dirty_hard_limit {
            return Some(CheckpointTrigger::DirtyHard);
        }
        if since_last < self.config.min_interval {
            return None;
        }
        if wal_size >= self.config.max_wal_size {
            return Some(CheckpointTrigger::WalSize);
        }
        if dirty_ratio >= self.config.dirty_soft_limit {
            return Some(CheckpointTrigger::DirtySoft);
        }
        if since_last >= self.config.max_interval {
            return Some(CheckpointTrigger::Timer);
        }
        None
    }

    /// Runs one checkpoint. At most one body executes at a time; the
    /// blocking flag is cleared and writers are woken on every exit
    /// path.
    fn do_checkpoint(&self, trigger: CheckpointTrigger) -> EngineResult<()> {
        let _serialize = self.checkpoint_lock.lock();
        let start = Instant::now();

        let is_blocking = trigger == CheckpointTrigger::DirtyHard;
        if is_blocking {
            self.set_blocking(true);
        }

        let result = self.run_protocol(trigger);

        self.set_blocking(false);
        *self.last_checkpoint.lock() = Instant::now();

        match result {
            Ok(pages_written) => {
                self.metrics.record_checkpoint(
                    start.elapsed(),
                    pages_written,
                    trigger.is_forced(),
                    is_blocking,
                );
                debug!(
                    %trigger,
                    pages = pages_written,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "checkpoint complete"
                );
                Ok(())
            }
            Err(err) => Err(EngineError::checkpoint_failed(err.to_string())),
        }
    }

    /// The six-phase checkpoint protocol. Returns the number of pages
    /// written.
    fn run_protocol(&self, trigger: CheckpointTrigger) -> EngineResult<usize> {
        // Phase 1: BEGIN.
        let begin_lsn = self.wal.write_checkpoint_begin()?;

        // Phase 2: snapshot the dirty set.
        let dirty_pages = self.buffer_pool.get_dirty_pages();

        // Phase 3: flush in batches; phase 4: make the writes durable.
        let mut pages_written = 0;
        if !dirty_pages.is_empty() {
            for batch in dirty_pages.chunks(self.config.batch_size) {
                // A stop request aborts the remainder, except during the
                // final shutdown checkpoint which runs to completion.
                if self.stop_requested.load(Ordering::Relaxed)
                    && trigger != CheckpointTrigger::Shutdown
                {
                    break;
                }

                if let Err(err) = self.buffer_pool.flush_pages(batch) {
                    warn!(%err, "checkpoint batch flush failed");
                    continue;
                }
                pages_written += batch.len();

                if trigger == CheckpointTrigger::DirtySoft {
                    std::thread::sleep(self.config.batch_throttle);
                }
            }

            self.buffer_pool.sync()?;
        }

        // Phase 5: END; durable before write_checkpoint_end returns.
        self.wal.write_checkpoint_end(begin_lsn)?;

        // Phase 6: reclaim obsolete segments.
        if let Err(err) = self.wal.truncate(begin_lsn) {
            warn!(%err, "WAL truncation after checkpoint failed");
        }

        Ok(pages_written)
    }

    /// Waits while a hard-limit checkpoint holds writers.
    ///
    /// Returns true if the caller actually waited.
    fn check_pressure(&self) -> bool {
        if !self.blocking.load(Ordering::Acquire) {
            return false;
        }

        let mut guard = self.block_lock.lock();
        while self.blocking.load(Ordering::Relaxed) && self.running.load(Ordering::Relaxed) {
            self.block_cv.wait(&mut guard);
        }
        true
    }

    /// Sets or clears the blocking flag under the block mutex, waking
    /// every held writer when clearing.
    fn set_blocking(&self, value: bool) {
        let _guard = self.block_lock.lock();
        self.blocking.store(value, Ordering::Release);
        if !value {
            self.block_cv.notify_all();
        }
    }
}

/// Coordinates adaptive checkpoints with back-pressure against writers.
pub struct CheckpointManager {
    worker: Arc<CheckpointWorker>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CheckpointManager {
    /// Creates a checkpoint manager. The background thread is not
    /// started until [`CheckpointManager::start`].
    pub fn new(
        config: CheckpointConfig,
        buffer_pool: Arc<BufferPool>,
        wal: Arc<WriteAheadLog>,
        metrics: Arc<StorageMetrics>,
    ) -> Self {
        Self {
            worker: Arc::new(CheckpointWorker {
                config,
                buffer_pool,
                wal,
                metrics,
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                requested: AtomicBool::new(false),
                blocking: AtomicBool::new(false),
                wake_lock: Mutex::new(()),
                wake_cv: Condvar::new(),
                block_lock: Mutex::new(()),
                block_cv: Condvar::new(),
                last_checkpoint: Mutex::new(Instant::now()),
                checkpoint_lock: Mutex::new(()),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Starts the background thread. Idempotent.
    pub fn start(&self) {
        if self.worker.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.worker.stop_requested.store(false, Ordering::Release);

        let worker = Arc::clone(&self.worker);
        let handle = std::thread::Builder::new()
            .name("checkpoint".to_string())
            .spawn(move || worker.background_loop())
            .expect("failed to spawn checkpoint thread");
        *self.thread.lock() = Some(handle);
        info!("checkpoint manager started");
    }

    /// Stops the background thread, releases any blocked writers, and
    /// runs a final shutdown checkpoint. Idempotent.
    pub fn stop(&self) {
        if !self.worker.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.worker.stop_requested.store(true, Ordering::Release);

        {
            let _guard = self.worker.wake_lock.lock();
            self.worker.wake_cv.notify_one();
        }
        self.worker.set_blocking(false);

        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!("checkpoint thread panicked");
            }
        }

        if let Err(err) = self.worker.do_checkpoint(CheckpointTrigger::Shutdown) {
            warn!(%err, "final shutdown checkpoint failed");
        }
        info!("checkpoint manager stopped");
    }

    /// Returns true while the background thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.running.load(Ordering::Acquire)
    }

    /// Requests an asynchronous checkpoint; the background thread picks
    /// it up on its next wakeup.
    pub fn request_checkpoint(&self) {
        self.worker.requested.store(true, Ordering::Release);
        let _guard = self.worker.wake_lock.lock();
        self.worker.wake_cv.notify_one();
    }

    /// Runs a checkpoint on the calling thread, blocking until it
    /// completes.
    pub fn checkpoint_sync(&self) -> EngineResult<()> {
        self.worker.do_checkpoint(CheckpointTrigger::Manual)
    }

    /// Blocks while a hard-limit checkpoint is holding writers.
    ///
    /// Returns true if the caller actually waited.
    pub fn check_pressure(&self) -> bool {
        self.worker.check_pressure()
    }
}

impl Drop for CheckpointManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("running", &self.is_running())
            .field("blocking", &self.worker.blocking.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::disk::DiskManager;
    use strata_wal::config::WalConfig;
    use tempfile::TempDir;

    struct Fixture {
        pool: Arc<BufferPool>,
        wal: Arc<WriteAheadLog>,
        metrics: Arc<StorageMetrics>,
        _tmp: TempDir,
    }

    fn fixture(pool_size: usize) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();

        let metrics = Arc::new(StorageMetrics::new());
        let disk = Arc::new(DiskManager::new(&dir));
        disk.open().unwrap();
        let pool = Arc::new(BufferPool::new(pool_size, disk, Arc::clone(&metrics)));
        let wal = Arc::new(WriteAheadLog::new(
            WalConfig::new(dir.join("wal")).with_segment_size(1 << 20),
            Arc::clone(&metrics),
        ));
        wal.open().unwrap();
        Fixture {
            pool,
            wal,
            metrics,
            _tmp: tmp,
        }
    }

    fn manager(fx: &Fixture, config: CheckpointConfig) -> CheckpointManager {
        CheckpointManager::new(
            config,
            Arc::clone(&fx.pool),
            Arc::clone(&fx.wal),
            Arc::clone(&fx.metrics),
        )
    }

    fn dirty_pages(pool: &BufferPool, count: usize) {
        for _ in 0..count {
            let handle = pool.new_page().unwrap();
            pool.release_page(handle.id(), true).unwrap();
        }
    }

    #[test]
    fn test_sync_checkpoint_clears_dirty_pages() {
        let fx = fixture(32);
        let mgr = manager(&fx, CheckpointConfig::default());

        dirty_pages(&fx.pool, 20);
        assert_eq!(fx.pool.dirty_count(), 20);

        mgr.checkpoint_sync().unwrap();

        assert_eq!(fx.pool.dirty_count(), 0);
        assert_eq!(fx.metrics.checkpoints(), 1);
        assert_eq!(
            fx.metrics.pages_written.load(Ordering::Relaxed),
            20
        );
        // Manual checkpoints are neither forced nor blocking.
        assert_eq!(fx.metrics.forced_count.load(Ordering::Relaxed), 0);
        assert_eq!(fx.metrics.blocking_checkpoints(), 0);
    }

    #[test]
    fn test_checkpoint_writes_wal_markers() {
        let fx = fixture(8);
        let mgr = manager(&fx, CheckpointConfig::default());

        let before = fx.wal.current_lsn();
        mgr.checkpoint_sync().unwrap();
        // One begin and one end record.
        assert_eq!(fx.wal.current_lsn(), before.offset(2));
        assert!(fx.wal.flushed_lsn() >= before.offset(1));
    }

    #[test]
    fn test_trigger_priority() {
        let fx = fixture(4);

        // Hard limit wins and ignores the min-interval floor.
        let mgr = manager(
            &fx,
            CheckpointConfig::default().with_dirty_hard_limit(0.25),
        );
        dirty_pages(&fx.pool, 2);
        assert_eq!(
            mgr.worker.should_checkpoint(),
            Some(CheckpointTrigger::DirtyHard)
        );

        // Below every threshold and inside min_interval: no trigger.
        let mgr = manager(&fx, CheckpointConfig::default());
        assert_eq!(mgr.worker.should_checkpoint(), None);
    }

    #[test]
    fn test_trigger_ladder_below_hard_limit() {
        let fx = fixture(8);
        let no_floor = CheckpointConfig::default().with_min_interval(Duration::ZERO);

        // WAL size outranks the soft dirty limit.
        let mgr = manager(
            &fx,
            no_floor
                .clone()
                .with_max_wal_size(1)
                .with_dirty_soft_limit(0.01),
        );
        dirty_pages(&fx.pool, 2);
        fx.wal
            .write_txn_begin(strata_common::types::TxnId::new(1))
            .unwrap();
        assert_eq!(
            mgr.worker.should_checkpoint(),
            Some(CheckpointTrigger::WalSize)
        );

        // Soft limit next.
        let mgr = manager(&fx, no_floor.clone().with_dirty_soft_limit(0.1));
        assert_eq!(
            mgr.worker.should_checkpoint(),
            Some(CheckpointTrigger::DirtySoft)
        );

        // Timer last.
        let fx2 = fixture(8);
        let mgr = manager(
            &fx2,
            CheckpointConfig::default()
                .with_min_interval(Duration::ZERO)
                .with_max_interval(Duration::ZERO),
        );
        assert_eq!(mgr.worker.should_checkpoint(), Some(CheckpointTrigger::Timer));
    }

    #[test]
    fn test_check_pressure_without_blocking_returns_immediately() {
        let fx = fixture(4);
        let mgr = manager(&fx, CheckpointConfig::default());
        assert!(!mgr.check_pressure());
    }

    #[test]
    fn test_check_pressure_waits_until_released() {
        let fx = fixture(4);
        let mgr = manager(&fx, CheckpointConfig::default());

        mgr.worker.running.store(true, Ordering::Release);
        mgr.worker.set_blocking(true);

        let worker = Arc::clone(&mgr.worker);
        let waiter = std::thread::spawn(move || worker.check_pressure());

        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        mgr.worker.set_blocking(false);
        assert!(waiter.join().unwrap());
        mgr.worker.running.store(false, Ordering::Release);
    }

    #[test]
    fn test_blocking_checkpoint_records_metric() {
        let fx = fixture(8);
        let mgr = manager(&fx, CheckpointConfig::default());

        dirty_pages(&fx.pool, 4);
        mgr.worker
            .do_checkpoint(CheckpointTrigger::DirtyHard)
            .unwrap();

        assert_eq!(fx.metrics.blocking_checkpoints(), 1);
        assert_eq!(fx.metrics.forced_count.load(Ordering::Relaxed), 1);
        assert!(!mgr.worker.blocking.load(Ordering::Relaxed));
        assert_eq!(fx.pool.dirty_count(), 0);
    }

    #[test]
    fn test_background_hard_limit_checkpoint() {
        let fx = fixture(10);
        let mgr = manager(
            &fx,
            CheckpointConfig::default().with_dirty_hard_limit(0.10),
        );

        dirty_pages(&fx.pool, 5);
        mgr.start();

        let deadline = Instant::now() + Duration::from_secs(10);
        while fx.pool.dirty_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }

        assert_eq!(fx.pool.dirty_count(), 0);
        assert!(fx.metrics.blocking_checkpoints() >= 1);
        mgr.stop();
    }

    #[test]
    fn test_request_checkpoint_is_async() {
        let fx = fixture(8);
        let mgr = manager(&fx, CheckpointConfig::default());
        mgr.start();

        dirty_pages(&fx.pool, 3);
        mgr.request_checkpoint();

        let deadline = Instant::now() + Duration::from_secs(10);
        while fx.metrics.checkpoints() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }

        assert!(fx.metrics.checkpoints() >= 1);
        assert_eq!(fx.pool.dirty_count(), 0);
        mgr.stop();
    }

    #[test]
    fn test_stop_runs_final_checkpoint() {
        let fx = fixture(8);
        let mgr = manager(&fx, CheckpointConfig::default());
        mgr.start();

        dirty_pages(&fx.pool, 3);
        mgr.stop();

        assert!(!mgr.is_running());
        assert_eq!(fx.pool.dirty_count(), 0);
        assert!(fx.metrics.checkpoints() >= 1);

        // Stop is idempotent.
        mgr.stop();
    }

    #[test]
    fn test_start_is_idempotent() {
        let fx = fixture(4);
        let mgr = manager(&fx, CheckpointConfig::default());
        mgr.start();
        mgr.start();
        assert!(mgr.is_running());
        mgr.stop();
    }
}
