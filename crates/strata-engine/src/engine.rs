//! The storage engine facade.

use std::sync::Arc;

use tracing::{debug, info};

use strata_common::metrics::StorageMetrics;
use strata_common::types::{Lsn, PageId};
use strata_storage::buffer::{BufferPool, PageHandle};
use strata_storage::disk::DiskManager;
use strata_wal::config::WalConfig;
use strata_wal::wal::WriteAheadLog;

use crate::checkpoint::CheckpointManager;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Owns the disk manager, WAL, buffer pool, and checkpoint manager, and
/// exposes the page and checkpoint API consumed by higher layers.
///
/// Construction order at `initialize()`: metrics, disk manager, WAL,
/// buffer pool, checkpoint manager. `shutdown()` reverses it: the
/// checkpoint manager stops (running the final checkpoint), the buffer
/// pool drops (flushing whatever is left), then the WAL and data file
/// close.
pub struct StorageEngine {
    config: EngineConfig,
    metrics: Arc<StorageMetrics>,
    disk: Option<Arc<DiskManager>>,
    wal: Option<Arc<WriteAheadLog>>,
    buffer_pool: Option<Arc<BufferPool>>,
    checkpoints: Option<CheckpointManager>,
}

impl StorageEngine {
    /// Creates an engine with the given configuration. Nothing touches
    /// disk until [`StorageEngine::initialize`].
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(StorageMetrics::new()),
            disk: None,
            wal: None,
            buffer_pool: None,
            checkpoints: None,
        }
    }

    /// Brings every subsystem up. Idempotent.
    pub fn initialize(&mut self) -> EngineResult<()> {
        if self.is_initialized() {
            return Ok(());
        }

        self.config.validate().map_err(EngineError::config)?;

        let disk = Arc::new(DiskManager::new(&self.config.data_directory));
        disk.open()?;

        let wal_config =
            WalConfig::new(self.config.wal_dir()).with_segment_size(self.config.wal_segment_size);
        let wal = Arc::new(WriteAheadLog::new(wal_config, Arc::clone(&self.metrics)));
        wal.open()?;

        let buffer_pool = Arc::new(BufferPool::new(
            self.config.buffer_pool_size,
            Arc::clone(&disk),
            Arc::clone(&self.metrics),
        ));

        let checkpoints = CheckpointManager::new(
            self.config.checkpoint.clone(),
            Arc::clone(&buffer_pool),
            Arc::clone(&wal),
            Arc::clone(&self.metrics),
        );
        checkpoints.start();

        self.disk = Some(disk);
        self.wal = Some(wal);
        self.buffer_pool = Some(buffer_pool);
        self.checkpoints = Some(checkpoints);

        info!(dir = %self.config.data_directory.display(), "storage engine initialized");
        Ok(())
    }

    /// Tears every subsystem down, flushing all remaining dirty state.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if !self.is_initialized() {
            return;
        }

        // Stops the background thread and runs the final checkpoint.
        if let Some(checkpoints) = self.checkpoints.take() {
            checkpoints.stop();
        }

        // Dropping the pool flushes whatever the final checkpoint missed.
        self.buffer_pool = None;

        if let Some(wal) = self.wal.take() {
            wal.close();
        }
        if let Some(disk) = self.disk.take() {
            disk.close();
        }

        info!("storage engine shut down");
    }

    /// Returns true while the engine is initialized.
    pub fn is_initialized(&self) -> bool {
        self.buffer_pool.is_some()
    }

    // =========================================================================
    // Page operations
    // =========================================================================

    /// Fetches a page, waiting out any hard-limit checkpoint first.
    ///
    /// The returned handle is pinned; the caller must pair it with
    /// [`StorageEngine::release_page`].
    pub fn get_page(&self, page_id: PageId) -> EngineResult<PageHandle> {
        let pool = self.buffer_pool.as_ref().ok_or(EngineError::NotInitialized)?;

        if let Some(checkpoints) = &self.checkpoints {
            if checkpoints.check_pressure() {
                debug!(%page_id, "writer waited on checkpoint back-pressure");
            }
        }

        Ok(pool.fetch_page(page_id)?)
    }

    /// Allocates a fresh page, waiting out any hard-limit checkpoint
    /// first.
    ///
    /// The returned handle is pinned; the caller must pair it with
    /// [`StorageEngine::release_page`].
    pub fn create_page(&self) -> EngineResult<PageHandle> {
        let pool = self.buffer_pool.as_ref().ok_or(EngineError::NotInitialized)?;

        if let Some(checkpoints) = &self.checkpoints {
            if checkpoints.check_pressure() {
                debug!("writer waited on checkpoint back-pressure");
            }
        }

        Ok(pool.new_page()?)
    }

    /// Releases a pinned page, marking it dirty when `modified`.
    pub fn release_page(&self, page_id: PageId, modified: bool) -> EngineResult<()> {
        let pool = self.buffer_pool.as_ref().ok_or(EngineError::NotInitialized)?;
        Ok(pool.release_page(page_id, modified)?)
    }

    // =========================================================================
    // Checkpointing
    // =========================================================================

    /// Requests an asynchronous checkpoint.
    pub fn checkpoint(&self) {
        if let Some(checkpoints) = &self.checkpoints {
            checkpoints.request_checkpoint();
        }
    }

    /// Runs a checkpoint on the calling thread and waits for it.
    pub fn checkpoint_sync(&self) -> EngineResult<()> {
        self.checkpoints
            .as_ref()
            .ok_or(EngineError::NotInitialized)?
            .checkpoint_sync()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Read-only handle to the shared metrics.
    pub fn metrics(&self) -> &StorageMetrics {
        &self.metrics
    }

    /// Number of pages currently resident in the buffer pool.
    pub fn buffer_pool_size(&self) -> usize {
        self.buffer_pool.as_ref().map_or(0, |pool| pool.len())
    }

    /// Number of dirty pages in the buffer pool.
    pub fn dirty_page_count(&self) -> usize {
        self.buffer_pool
            .as_ref()
            .map_or(0, |pool| pool.dirty_count())
    }

    /// Total WAL size in bytes.
    pub fn wal_size(&self) -> u64 {
        self.wal.as_ref().map_or(0, |wal| wal.size())
    }

    /// Next LSN the WAL will assign.
    pub fn current_lsn(&self) -> Lsn {
        self.wal.as_ref().map_or(Lsn::INVALID, |wal| wal.current_lsn())
    }

    /// Total number of allocated pages.
    pub fn page_count(&self) -> u32 {
        self.disk.as_ref().map_or(0, |disk| disk.page_count())
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("initialized", &self.is_initialized())
            .field("page_count", &self.page_count())
            .field("dirty_pages", &self.dirty_page_count())
            .field("wal_size", &self.wal_size())
            .finish()
    }
}
