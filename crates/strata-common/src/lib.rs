//! # strata-common
//!
//! Common types and utilities shared by every StrataDB storage crate.
//!
//! This crate provides:
//!
//! - **Types**: the core identifiers (`PageId`, `Lsn`, `TxnId`)
//! - **Constants**: fixed on-disk layout values and defaults
//! - **Metrics**: the shared, lock-free [`StorageMetrics`] bundle

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod metrics;
pub mod types;

pub use metrics::StorageMetrics;
pub use types::{Lsn, PageId, TxnId};
