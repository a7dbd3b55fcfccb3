//! WAL error types.

use std::io;

use strata_common::types::Lsn;
use thiserror::Error;

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// I/O error during WAL operations.
    #[error("WAL I/O error: {source}")]
    Io {
        /// Underlying OS error.
        #[from]
        source: io::Error,
    },

    /// The WAL has not been opened (or was closed).
    #[error("WAL is not open")]
    NotOpen,

    /// A record or segment is structurally corrupted.
    #[error("WAL corrupted: {reason}")]
    Corrupted {
        /// Human-readable description of the corruption.
        reason: String,
    },

    /// A record failed checksum verification.
    #[error("WAL record checksum mismatch at LSN {lsn}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// LSN claimed by the record header.
        lsn: Lsn,
        /// Checksum stored in the record header.
        stored: u32,
        /// Checksum computed over the record bytes.
        computed: u32,
    },

    /// A record does not fit in a single segment.
    #[error("WAL record too large: {size} bytes exceeds maximum {max} bytes")]
    RecordTooLarge {
        /// Serialized record size.
        size: usize,
        /// Largest supported record size.
        max: usize,
    },

    /// Flushing a segment to stable storage failed.
    #[error("failed to sync WAL segment: {source}")]
    SyncError {
        /// Underlying OS error.
        source: io::Error,
    },

    /// An invalid LSN was passed to an operation that requires one.
    #[error("invalid LSN: {lsn}")]
    InvalidLsn {
        /// The offending LSN.
        lsn: Lsn,
    },
}

impl WalError {
    /// Creates a corruption error.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Self::Corrupted {
            reason: reason.into(),
        }
    }

    /// Creates a record-too-large error.
    pub fn record_too_large(size: usize, max: usize) -> Self {
        Self::RecordTooLarge { size, max }
    }

    /// Returns true if this error indicates on-disk corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::ChecksumMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_corruption() {
        assert!(WalError::corrupted("truncated header").is_corruption());

        let err = WalError::ChecksumMismatch {
            lsn: Lsn::new(9),
            stored: 1,
            computed: 2,
        };
        assert!(err.is_corruption());

        assert!(!WalError::NotOpen.is_corruption());
        assert!(!WalError::record_too_large(10, 5).is_corruption());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: WalError = io_err.into();
        assert!(matches!(err, WalError::Io { .. }));
    }
}
