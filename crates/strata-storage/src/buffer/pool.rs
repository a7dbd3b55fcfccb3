//! Buffer pool implementation.

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use strata_common::metrics::StorageMetrics;
use strata_common::types::PageId;

use super::error::{BufferError, BufferResult};
use super::eviction::ClockSweeper;
use super::frame::{BufferFrame, FrameId};
use crate::disk::DiskManager;
use crate::page::Page;

/// State protected by the pool latch: the page table, the free list,
/// and the clock hand.
struct PoolInner {
    /// Maps resident page IDs to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently holding a page.
    free_list: VecDeque<FrameId>,
    /// Victim selector.
    sweeper: ClockSweeper,
}

/// A pinned page checked out of the buffer pool.
///
/// The handle keeps the frame alive and derefs to the page, whose data
/// lock gives exclusive payload access without any pool lock held. The
/// pin is released only by [`BufferPool::release_page`]; a handle must
/// not be used after its page has been released.
pub struct PageHandle {
    frame: Arc<BufferFrame>,
    page_id: PageId,
}

impl PageHandle {
    /// The ID of the pinned page.
    #[inline]
    pub fn id(&self) -> PageId {
        self.page_id
    }

    /// The pinned page.
    #[inline]
    pub fn page(&self) -> &Page {
        self.frame.page()
    }
}

impl Deref for PageHandle {
    type Target = Page;

    fn deref(&self) -> &Page {
        self.frame.page()
    }
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_id", &self.page_id)
            .field("pin_count", &self.page().pin_count())
            .finish()
    }
}

/// Fixed-size page cache with pin/unpin semantics and Clock-Sweep
/// eviction.
pub struct BufferPool {
    /// Number of frames.
    pool_size: usize,
    /// Disk manager performing the actual page I/O.
    disk: Arc<DiskManager>,
    /// Shared metrics (dirty-page gauge).
    metrics: Arc<StorageMetrics>,
    /// Frame storage; the vector itself never changes after construction.
    frames: Vec<Arc<BufferFrame>>,
    /// Page table, free list, and clock hand.
    inner: RwLock<PoolInner>,
    /// Dirty page count, readable without the latch.
    dirty_count: AtomicUsize,
}

impl BufferPool {
    /// Creates a pool with `pool_size` frames.
    pub fn new(pool_size: usize, disk: Arc<DiskManager>, metrics: Arc<StorageMetrics>) -> Self {
        assert!(pool_size > 0, "buffer pool must have at least one frame");

        let frames: Vec<Arc<BufferFrame>> = (0..pool_size)
            .map(|i| Arc::new(BufferFrame::new(FrameId::new(i as u32))))
            .collect();
        let free_list: VecDeque<FrameId> =
            (0..pool_size).map(|i| FrameId::new(i as u32)).collect();

        Self {
            pool_size,
            disk,
            metrics,
            frames,
            inner: RwLock::new(PoolInner {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
                sweeper: ClockSweeper::new(pool_size),
            }),
            dirty_count: AtomicUsize::new(0),
        }
    }

    // =========================================================================
    // Page access
    // =========================================================================

    /// Fetches a page, loading it from disk if it is not resident.
    ///
    /// The returned handle is pinned; the caller must pair it with a
    /// [`BufferPool::release_page`] call.
    pub fn fetch_page(&self, page_id: PageId) -> BufferResult<PageHandle> {
        let mut inner = self.inner.write();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.index()];
            frame.page().pin();
            frame.set_referenced(true);
            return Ok(PageHandle {
                frame: Arc::clone(frame),
                page_id,
            });
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.frames[frame_id.index()];

        if let Err(err) = self.disk.read_page(page_id, frame.page()) {
            frame.reset();
            inner.free_list.push_back(frame_id);
            return Err(err.into());
        }

        frame.page().pin();
        frame.set_referenced(true);
        inner.page_table.insert(page_id, frame_id);

        Ok(PageHandle {
            frame: Arc::clone(frame),
            page_id,
        })
    }

    /// Allocates a fresh page on disk and installs it in a frame.
    ///
    /// The returned handle is pinned; the caller must pair it with a
    /// [`BufferPool::release_page`] call.
    pub fn new_page(&self) -> BufferResult<PageHandle> {
        let mut inner = self.inner.write();

        let page_id = self.disk.allocate_page()?;
        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.frames[frame_id.index()];

        frame.page().reset_to(page_id);
        frame.page().pin();
        frame.set_referenced(true);
        inner.page_table.insert(page_id, frame_id);

        Ok(PageHandle {
            frame: Arc::clone(frame),
            page_id,
        })
    }

    /// Releases one pin on a resident page.
    ///
    /// With `modified = true` the page becomes dirty (if it was not
    /// already) and the dirty counter is published to the metrics.
    pub fn release_page(&self, page_id: PageId, modified: bool) -> BufferResult<()> {
        let inner = self.inner.write();

        let &frame_id = inner
            .page_table
            .get(&page_id)
            .ok_or(BufferError::PageNotFound { page_id })?;
        let frame = &self.frames[frame_id.index()];

        if frame.page().pin_count() == 0 {
            return Err(BufferError::NotPinned { page_id });
        }
        frame.page().unpin();

        if modified && !frame.page().is_dirty() {
            frame.page().mark_dirty();
            let dirty = self.dirty_count.fetch_add(1, Ordering::Relaxed) + 1;
            self.metrics.dirty_pages.store(dirty, Ordering::Relaxed);
        }

        Ok(())
    }

    /// Writes a resident dirty page back to disk and marks it clean.
    ///
    /// A page that is not resident, or resident but clean, is a no-op.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<()> {
        let inner = self.inner.write();

        let frame = match inner.page_table.get(&page_id) {
            Some(&frame_id) => &self.frames[frame_id.index()],
            None => return Ok(()),
        };
        if !frame.page().is_dirty() {
            return Ok(());
        }

        self.disk.write_page(page_id, frame.page())?;
        frame.page().mark_clean();
        let dirty = self.dirty_count.fetch_sub(1, Ordering::Relaxed) - 1;
        self.metrics.dirty_pages.store(dirty, Ordering::Relaxed);

        Ok(())
    }

    /// Flushes a batch of pages.
    ///
    /// A failure on one page does not prevent attempting the rest;
    /// failures are logged and the first one is returned.
    pub fn flush_pages(&self, page_ids: &[PageId]) -> BufferResult<()> {
        let mut first_error = None;

        for &page_id in page_ids {
            if let Err(err) = self.flush_page(page_id) {
                warn!(%page_id, %err, "failed to flush page");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drops a page from the pool and releases its disk slot.
    ///
    /// Fails with [`BufferError::PagePinned`] while any pin is
    /// outstanding. The frame returns to the free list; the on-disk slot
    /// is handed to the disk manager (currently a no-op).
    pub fn delete_page(&self, page_id: PageId) -> BufferResult<()> {
        let mut inner = self.inner.write();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(self.disk.deallocate_page(page_id)?),
        };
        let frame = &self.frames[frame_id.index()];

        if frame.page().is_pinned() {
            return Err(BufferError::PagePinned { page_id });
        }

        if frame.page().is_dirty() {
            let dirty = self.dirty_count.fetch_sub(1, Ordering::Relaxed) - 1;
            self.metrics.dirty_pages.store(dirty, Ordering::Relaxed);
        }

        inner.page_table.remove(&page_id);
        frame.reset();
        inner.free_list.push_back(frame_id);

        Ok(self.disk.deallocate_page(page_id)?)
    }

    // =========================================================================
    // Bulk operations (checkpoint support)
    // =========================================================================

    /// Returns a snapshot of every resident dirty page ID.
    ///
    /// Takes the shared side of the latch and performs no I/O, so the
    /// checkpoint manager can plan a batch flush without stalling
    /// writers.
    pub fn get_dirty_pages(&self) -> Vec<PageId> {
        let inner = self.inner.read();

        let mut dirty = Vec::with_capacity(self.dirty_count.load(Ordering::Relaxed));
        for (&page_id, &frame_id) in &inner.page_table {
            if self.frames[frame_id.index()].page().is_dirty() {
                dirty.push(page_id);
            }
        }
        dirty
    }

    /// Flushes OS buffers for the underlying data file.
    pub fn sync(&self) -> BufferResult<()> {
        Ok(self.disk.sync()?)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Total pool capacity in frames.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.pool_size
    }

    /// Number of pages currently resident.
    pub fn len(&self) -> usize {
        self.inner.read().page_table.len()
    }

    /// Returns true if no pages are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dirty pages, read without the latch.
    #[inline]
    pub fn dirty_count(&self) -> usize {
        self.dirty_count.load(Ordering::Relaxed)
    }

    /// Number of currently pinned pages.
    pub fn pinned_count(&self) -> usize {
        let inner = self.inner.read();
        inner
            .page_table
            .values()
            .filter(|frame_id| self.frames[frame_id.index()].page().is_pinned())
            .count()
    }

    /// Returns true if the page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.read().page_table.contains_key(&page_id)
    }

    /// Runs `f` for every resident page under the shared latch.
    pub fn for_each_page(&self, mut f: impl FnMut(PageId, &Page)) {
        let inner = self.inner.read();
        for (&page_id, &frame_id) in &inner.page_table {
            f(page_id, self.frames[frame_id.index()].page());
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Hands out a usable frame: from the free list if possible,
    /// otherwise by evicting a Clock-Sweep victim.
    fn acquire_frame(&self, inner: &mut PoolInner) -> BufferResult<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = inner
            .sweeper
            .find_victim(&self.frames)
            .ok_or(BufferError::NoAvailableFrames)?;
        self.evict_frame(inner, frame_id)?;
        Ok(frame_id)
    }

    /// Evicts the page held by `frame_id`: writes it back if dirty,
    /// drops the table entry, and resets the frame.
    fn evict_frame(&self, inner: &mut PoolInner, frame_id: FrameId) -> BufferResult<()> {
        let frame = &self.frames[frame_id.index()];
        let page_id = frame.page().id();

        if frame.page().is_dirty() {
            self.disk.write_page(page_id, frame.page())?;
            let dirty = self.dirty_count.fetch_sub(1, Ordering::Relaxed) - 1;
            self.metrics.dirty_pages.store(dirty, Ordering::Relaxed);
        }

        inner.page_table.remove(&page_id);
        frame.reset();
        Ok(())
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        // Best-effort write-back of whatever is still dirty.
        let dirty = self.get_dirty_pages();
        if !dirty.is_empty() {
            if let Err(err) = self.flush_pages(&dirty) {
                warn!(%err, "failed to flush dirty pages on drop");
            }
            if let Err(err) = self.sync() {
                warn!(%err, "failed to sync data file on drop");
            }
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.pool_size)
            .field("resident", &self.len())
            .field("dirty", &self.dirty_count())
            .finish()
    }
}
