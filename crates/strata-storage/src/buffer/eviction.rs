//! Clock-Sweep victim selection.
//!
//! Clock-Sweep approximates LRU with one reference bit per frame and a
//! rotating hand. A frame whose bit is set gets one second chance (the
//! bit is cleared and the hand moves on); a frame whose bit is clear is
//! the victim. Pinned and empty frames are never candidates.

use std::sync::Arc;

use super::frame::{BufferFrame, FrameId};

/// Clock-Sweep victim selector.
///
/// The sweeper only picks victims; writing back and resetting the
/// chosen frame is the pool's job. It lives inside the pool's latch, so
/// hand movement is serialized with page-table updates.
#[derive(Debug)]
pub struct ClockSweeper {
    /// Number of frames in the pool.
    num_frames: usize,
    /// Current position of the clock hand.
    hand: usize,
}

impl ClockSweeper {
    /// Creates a sweeper for the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            hand: 0,
        }
    }

    /// Finds a victim frame, or `None` when every frame is pinned or
    /// empty after two full passes of the wheel.
    ///
    /// The first pass over a fully-referenced wheel clears bits; the
    /// second pass then finds a victim, so two passes bound the search.
    /// The hand is left one past the chosen slot.
    pub fn find_victim(&mut self, frames: &[Arc<BufferFrame>]) -> Option<FrameId> {
        debug_assert_eq!(frames.len(), self.num_frames);

        for _ in 0..2 * self.num_frames {
            let pos = self.hand;
            self.hand = (self.hand + 1) % self.num_frames;

            let frame = &frames[pos];
            if frame.is_empty() || frame.page().is_pinned() {
                continue;
            }
            if frame.take_referenced() {
                // Second chance.
                continue;
            }
            return Some(FrameId::new(pos as u32));
        }

        None
    }

    /// Returns the current hand position.
    #[inline]
    pub fn hand(&self) -> usize {
        self.hand
    }
}
