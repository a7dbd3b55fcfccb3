//! Engine and checkpoint configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use strata_common::constants::{DEFAULT_BUFFER_POOL_PAGES, DEFAULT_WAL_SEGMENT_SIZE, WAL_DIR_NAME};

/// Checkpoint trigger policy configuration.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Upper bound between checkpoints; a periodic checkpoint runs once
    /// this much time has passed.
    pub max_interval: Duration,
    /// Floor between non-critical checkpoints; prevents checkpoint
    /// storms.
    pub min_interval: Duration,
    /// WAL size that triggers a checkpoint.
    pub max_wal_size: u64,
    /// Fraction of dirty frames above which a throttled background
    /// checkpoint runs.
    pub dirty_soft_limit: f64,
    /// Fraction of dirty frames above which a blocking checkpoint runs
    /// and writers are held.
    pub dirty_hard_limit: f64,
    /// Pages flushed per batch.
    pub batch_size: usize,
    /// Sleep between batches during soft-limit checkpoints.
    pub batch_throttle: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            max_interval: Duration::from_secs(60),
            min_interval: Duration::from_secs(5),
            max_wal_size: 1 << 30,
            dirty_soft_limit: 0.70,
            dirty_hard_limit: 0.90,
            batch_size: 256,
            batch_throttle: Duration::from_micros(100),
        }
    }
}

impl CheckpointConfig {
    /// Sets the maximum interval between checkpoints.
    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Sets the minimum interval between non-critical checkpoints.
    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Sets the WAL size trigger.
    #[must_use]
    pub fn with_max_wal_size(mut self, size: u64) -> Self {
        self.max_wal_size = size;
        self
    }

    /// Sets the soft dirty-page limit.
    #[must_use]
    pub fn with_dirty_soft_limit(mut self, limit: f64) -> Self {
        self.dirty_soft_limit = limit;
        self
    }

    /// Sets the hard dirty-page limit.
    #[must_use]
    pub fn with_dirty_hard_limit(mut self, limit: f64) -> Self {
        self.dirty_hard_limit = limit;
        self
    }

    /// Sets the flush batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the inter-batch throttle for soft-limit checkpoints.
    #[must_use]
    pub fn with_batch_throttle(mut self, throttle: Duration) -> Self {
        self.batch_throttle = throttle;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("checkpoint batch size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.dirty_soft_limit)
            || !(0.0..=1.0).contains(&self.dirty_hard_limit)
        {
            return Err("dirty limits must lie in [0, 1]".to_string());
        }
        if self.dirty_soft_limit > self.dirty_hard_limit {
            return Err("soft dirty limit must not exceed the hard limit".to_string());
        }
        if self.min_interval > self.max_interval {
            return Err("min interval must not exceed max interval".to_string());
        }
        Ok(())
    }
}

/// Storage engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the data layout (`data.db` plus the `wal/` directory).
    pub data_directory: PathBuf,
    /// Number of buffer pool frames.
    pub buffer_pool_size: usize,
    /// WAL segment rotation threshold in bytes.
    pub wal_segment_size: usize,
    /// Checkpoint policy.
    pub checkpoint: CheckpointConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./data"),
            buffer_pool_size: DEFAULT_BUFFER_POOL_PAGES,
            wal_segment_size: DEFAULT_WAL_SEGMENT_SIZE,
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration rooted at the given data directory.
    pub fn new(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
            ..Default::default()
        }
    }

    /// Sets the buffer pool size in frames.
    #[must_use]
    pub fn with_buffer_pool_size(mut self, pages: usize) -> Self {
        self.buffer_pool_size = pages;
        self
    }

    /// Sets the WAL segment size.
    #[must_use]
    pub fn with_wal_segment_size(mut self, size: usize) -> Self {
        self.wal_segment_size = size;
        self
    }

    /// Sets the checkpoint policy.
    #[must_use]
    pub fn with_checkpoint(mut self, checkpoint: CheckpointConfig) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Returns the WAL directory inside the data directory.
    pub fn wal_dir(&self) -> PathBuf {
        self.data_directory.join(WAL_DIR_NAME)
    }

    /// Returns the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_directory
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_pool_size == 0 {
            return Err("buffer pool size must be positive".to_string());
        }
        self.checkpoint.validate()
    }
}
