//! Buffer pool errors.

use strata_common::types::PageId;
use thiserror::Error;

use crate::error::StorageError;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Victim selection failed: every frame is pinned.
    #[error("no available frames, all pages are pinned")]
    NoAvailableFrames,

    /// The page is not resident in the pool.
    #[error("page {page_id} not found in buffer pool")]
    PageNotFound {
        /// The requested page.
        page_id: PageId,
    },

    /// The operation requires an unpinned page.
    #[error("page {page_id} is pinned")]
    PagePinned {
        /// The pinned page.
        page_id: PageId,
    },

    /// A release was attempted on a page with no outstanding pins.
    #[error("page {page_id} is not pinned")]
    NotPinned {
        /// The unpinned page.
        page_id: PageId,
    },

    /// Disk I/O below the pool failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
