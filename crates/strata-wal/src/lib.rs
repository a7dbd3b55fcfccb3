//! # strata-wal
//!
//! Write-ahead logging for StrataDB: an append-only log partitioned
//! into fixed-size segments, with per-record checksums, segment
//! rotation, and truncation after durable checkpoints.
//!
//! Recovery itself lives above this crate; the log format guarantees
//! what a future recovery pass needs: strictly monotonic LSNs,
//! per-record checksums (so a torn tail is detectable), records that
//! never cross segment boundaries, and a force-flushed `CheckpointEnd`
//! before any truncation.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// WAL configuration.
pub mod config;

/// WAL error types.
pub mod error;

/// Log record types and (de)serialization.
pub mod record;

/// Segment file naming, enumeration, and scanning.
pub mod segment;

/// The WAL manager.
pub mod wal;

pub use config::WalConfig;
pub use error::{WalError, WalResult};
pub use record::{LogRecord, LogRecordHeader, LogRecordType};
pub use wal::WriteAheadLog;
