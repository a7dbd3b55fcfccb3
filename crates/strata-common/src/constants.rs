//! System-wide constants for the StrataDB storage core.

// =============================================================================
// Page layout
// =============================================================================

/// Page size in bytes. Fixed at 4 KiB; every page on disk and in memory is
/// exactly this large.
pub const PAGE_SIZE: usize = 4096;

/// Size of the on-disk page header in bytes.
///
/// The header contains: page_id (4), page_lsn (8), free_space (2),
/// flags (2), checksum (4), reserved (4) = 24 bytes.
pub const PAGE_HEADER_SIZE: usize = 24;

/// Usable payload bytes per page (everything after the header).
pub const PAGE_PAYLOAD_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Byte offset of the checksum field within the page header.
pub const PAGE_CHECKSUM_OFFSET: usize = 16;

// =============================================================================
// WAL layout
// =============================================================================

/// Size of the packed WAL record header in bytes.
///
/// Contains: lsn (8), txn_id (8), prev_lsn (8), length (4), page_id (4),
/// checksum (4), offset (2), data_length (2), type (1), reserved (3) = 44.
pub const LOG_RECORD_HEADER_SIZE: usize = 44;

/// Byte offset of the checksum field within a serialized WAL record.
pub const LOG_RECORD_CHECKSUM_OFFSET: usize = 32;

/// Default WAL segment size (64 MiB). A segment is closed and a new one
/// opened before a record would cross this boundary.
pub const DEFAULT_WAL_SEGMENT_SIZE: usize = 64 * 1024 * 1024;

/// Prefix of WAL segment file names (`wal_00000000.log`).
pub const WAL_SEGMENT_PREFIX: &str = "wal_";

/// Suffix of WAL segment file names.
pub const WAL_SEGMENT_SUFFIX: &str = ".log";

/// Number of decimal digits in a WAL segment file name.
pub const WAL_SEGMENT_DIGITS: usize = 8;

// =============================================================================
// Defaults
// =============================================================================

/// Default number of buffer pool frames (10 000 pages ~= 40 MiB).
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 10_000;

/// Name of the single data file inside the data directory.
pub const DATA_FILE_NAME: &str = "data.db";

/// Name of the WAL directory inside the data directory.
pub const WAL_DIR_NAME: &str = "wal";
