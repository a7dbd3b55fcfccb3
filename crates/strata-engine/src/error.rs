//! Engine error types.

use thiserror::Error;

use strata_storage::buffer::BufferError;
use strata_storage::error::StorageError;
use strata_wal::error::WalError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the storage engine facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Buffer pool operation failed.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// WAL operation failed.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// Disk manager operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The engine has not been initialized (or was shut down).
    #[error("storage engine is not initialized")]
    NotInitialized,

    /// A checkpoint did not complete.
    #[error("checkpoint failed: {reason}")]
    CheckpointFailed {
        /// What went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    Config {
        /// What is wrong with the configuration.
        reason: String,
    },
}

impl EngineError {
    /// Creates a checkpoint failure with context.
    pub fn checkpoint_failed(reason: impl Into<String>) -> Self {
        Self::CheckpointFailed {
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let err: EngineError = BufferError::NoAvailableFrames.into();
        assert!(matches!(err, EngineError::Buffer(_)));

        let err: EngineError = WalError::NotOpen.into();
        assert!(matches!(err, EngineError::Wal(_)));

        let err: EngineError = StorageError::NotOpen.into();
        assert!(matches!(err, EngineError::Storage(_)));
    }

    #[test]
    fn test_display() {
        let err = EngineError::checkpoint_failed("sync failed");
        assert_eq!(err.to_string(), "checkpoint failed: sync failed");
    }
}
