//! Storage error types.

use std::io;

use strata_common::types::PageId;
use thiserror::Error;

/// Result type for disk manager operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during disk I/O.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Generic I/O error.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying OS error.
        #[from]
        source: io::Error,
    },

    /// The disk manager has not been opened (or was closed).
    #[error("disk manager is not open")]
    NotOpen,

    /// A page ID outside the allocated range was requested.
    #[error("invalid page ID {page_id} (page count: {page_count})")]
    InvalidPageId {
        /// The offending page ID.
        page_id: PageId,
        /// Number of pages currently allocated.
        page_count: u32,
    },

    /// Reading a page from the data file failed.
    #[error("failed to read page {page_id}: {source}")]
    ReadError {
        /// The page being read.
        page_id: PageId,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Writing a page to the data file failed.
    #[error("failed to write page {page_id}: {source}")]
    WriteError {
        /// The page being written.
        page_id: PageId,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Syncing the data file to stable storage failed.
    #[error("failed to sync data file: {source}")]
    SyncError {
        /// Underlying OS error.
        source: io::Error,
    },

    /// A page read from disk failed checksum verification.
    #[error(
        "checksum mismatch for page {page_id}: stored {stored:#010x}, computed {computed:#010x}"
    )]
    ChecksumMismatch {
        /// The corrupted page.
        page_id: PageId,
        /// Checksum stored in the page header.
        stored: u32,
        /// Checksum computed over the page contents.
        computed: u32,
    },

    /// The data file is structurally corrupted.
    #[error("data file corrupted: {reason}")]
    Corrupted {
        /// Human-readable description of the corruption.
        reason: String,
    },
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Self::Corrupted {
            reason: reason.into(),
        }
    }

    /// Returns true if this error indicates on-disk corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. } | Self::Corrupted { .. })
    }
}
