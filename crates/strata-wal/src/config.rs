//! WAL configuration.

use std::path::{Path, PathBuf};

use strata_common::constants::DEFAULT_WAL_SEGMENT_SIZE;

use crate::segment::segment_file_name;

/// Configuration for the write-ahead log.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory where WAL segments are stored.
    pub dir: PathBuf,
    /// Size of each segment file in bytes. A record never crosses a
    /// segment boundary; the segment is rotated first.
    pub segment_size: usize,
}

impl WalConfig {
    /// Smallest accepted segment size.
    pub const MIN_SEGMENT_SIZE: usize = 4096;

    /// Creates a configuration with the given directory and default
    /// segment size.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            segment_size: DEFAULT_WAL_SEGMENT_SIZE,
        }
    }

    /// Sets the segment size.
    #[must_use]
    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.segment_size < Self::MIN_SEGMENT_SIZE {
            return Err(format!(
                "segment size must be at least {} bytes",
                Self::MIN_SEGMENT_SIZE
            ));
        }
        Ok(())
    }

    /// Returns the file path for the given segment ID.
    pub fn segment_path(&self, segment_id: u64) -> PathBuf {
        self.dir.join(segment_file_name(segment_id))
    }

    /// Returns the WAL directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WalConfig::new("/tmp/wal");
        assert_eq!(config.segment_size, DEFAULT_WAL_SEGMENT_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = WalConfig::new("/tmp/wal").with_segment_size(1024 * 1024);
        assert_eq!(config.segment_size, 1024 * 1024);
    }

    #[test]
    fn test_validation() {
        let config = WalConfig::new("/tmp/wal").with_segment_size(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_segment_path() {
        let config = WalConfig::new("/data/wal");
        assert_eq!(
            config.segment_path(0),
            PathBuf::from("/data/wal/wal_00000000.log")
        );
        assert_eq!(
            config.segment_path(42),
            PathBuf::from("/data/wal/wal_00000042.log")
        );
    }
}
