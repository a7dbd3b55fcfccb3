//! Core identifier types.

mod ids;

pub use ids::{Lsn, PageId, TxnId};
