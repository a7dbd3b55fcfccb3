//! Buffer pool.
//!
//! The buffer pool caches a fixed number of pages in memory, guarantees
//! at-most-one resident copy per page ID, tracks dirty pages, and uses
//! Clock-Sweep to pick eviction victims when every frame is occupied.
//!
//! A single reader/writer latch protects the page table, free list, and
//! clock hand; page contents are guarded per-frame so callers can work
//! on a pinned page without holding the pool latch. The dirty-page
//! counter is additionally exposed as an atomic for lock-free readers
//! such as the checkpoint policy thread.

mod error;
mod eviction;
mod frame;
mod pool;

pub use error::{BufferError, BufferResult};
pub use eviction::ClockSweeper;
pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, PageHandle};
