//! The in-memory page representation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use strata_common::constants::{PAGE_CHECKSUM_OFFSET, PAGE_HEADER_SIZE, PAGE_SIZE};
use strata_common::types::{Lsn, PageId};

use super::checksum::page_checksum;
use super::flags::PageFlags;
use super::header::PageHeader;

/// One fixed-size page: a 4 KiB buffer plus in-memory state.
///
/// The buffer holds the on-disk representation (header + payload). The
/// pin count and dirty flag exist only in memory; the `DIRTY`/`PINNED`
/// bits of the on-disk flag word are advisory and never consulted.
///
/// The buffer sits behind its own `RwLock`, so a caller holding a
/// pinned page can read or mutate the payload without any buffer pool
/// lock held. Pin count, dirty flag, and the cached page ID are atomics
/// and can be inspected lock-free (the clock sweep relies on this).
pub struct Page {
    /// Page contents, exactly `PAGE_SIZE` bytes.
    data: RwLock<Vec<u8>>,
    /// Page ID this buffer currently holds (`INVALID` when unassigned).
    id: AtomicU32,
    /// Number of outstanding pins.
    pin_count: AtomicU32,
    /// Whether the in-memory contents differ from the on-disk copy.
    dirty: AtomicBool,
}

impl Page {
    /// Creates a zeroed page with no assigned ID.
    pub fn new() -> Self {
        let page = Self {
            data: RwLock::new(vec![0u8; PAGE_SIZE]),
            id: AtomicU32::new(PageId::INVALID.as_u32()),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        };
        page.reset();
        page
    }

    /// Creates a zeroed page with the given ID.
    pub fn with_id(id: PageId) -> Self {
        let page = Self::new();
        page.set_id(id);
        page
    }

    // =========================================================================
    // Page ID
    // =========================================================================

    /// Returns the in-memory page ID.
    #[inline]
    pub fn id(&self) -> PageId {
        PageId::new(self.id.load(Ordering::Acquire))
    }

    /// Assigns a page ID, updating both the in-memory copy and the header.
    pub fn set_id(&self, id: PageId) {
        self.id.store(id.as_u32(), Ordering::Release);
        let mut data = self.data.write();
        PageHeader::new(&mut data).set_page_id(id);
    }

    // =========================================================================
    // Pin counting
    // =========================================================================

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Returns true if the page is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Increments the pin count and returns the new value.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    ///
    /// Unpinning an unpinned page is a no-op; the count never underflows.
    pub fn unpin(&self) -> u32 {
        let mut current = self.pin_count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return 0;
            }
            match self.pin_count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current - 1,
                Err(observed) => current = observed,
            }
        }
    }

    // =========================================================================
    // Dirty tracking
    // =========================================================================

    /// Returns true if the page has unflushed modifications.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Marks the page dirty.
    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Marks the page clean.
    #[inline]
    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    // =========================================================================
    // Header fields
    // =========================================================================

    /// Returns the LSN of the last record that modified this page.
    pub fn lsn(&self) -> Lsn {
        let mut data = self.data.write();
        PageHeader::new(&mut data).lsn()
    }

    /// Sets the page LSN.
    pub fn set_lsn(&self, lsn: Lsn) {
        let mut data = self.data.write();
        PageHeader::new(&mut data).set_lsn(lsn);
    }

    /// Returns the advisory free byte count.
    pub fn free_space(&self) -> u16 {
        let mut data = self.data.write();
        PageHeader::new(&mut data).free_space()
    }

    /// Sets the advisory free byte count.
    pub fn set_free_space(&self, space: u16) {
        let mut data = self.data.write();
        PageHeader::new(&mut data).set_free_space(space);
    }

    /// Returns the on-disk flag word.
    pub fn flags(&self) -> PageFlags {
        let mut data = self.data.write();
        PageHeader::new(&mut data).flags()
    }

    /// Replaces the on-disk flag word.
    pub fn set_flags(&self, flags: PageFlags) {
        let mut data = self.data.write();
        PageHeader::new(&mut data).set_flags(flags);
    }

    /// Sets the given flag bits.
    pub fn add_flags(&self, bits: u16) {
        let mut data = self.data.write();
        let mut header = PageHeader::new(&mut data);
        let mut flags = header.flags();
        flags.insert(bits);
        header.set_flags(flags);
    }

    /// Clears the given flag bits.
    pub fn remove_flags(&self, bits: u16) {
        let mut data = self.data.write();
        let mut header = PageHeader::new(&mut data);
        let mut flags = header.flags();
        flags.remove(bits);
        header.set_flags(flags);
    }

    /// Returns true if all of the given flag bits are set.
    pub fn has_flags(&self, bits: u16) -> bool {
        self.flags().contains(bits)
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// Returns a shared guard over the full page buffer (header included).
    pub fn data(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read()
    }

    /// Returns an exclusive guard over the full page buffer.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write()
    }

    /// Returns a shared guard over the payload bytes.
    pub fn payload(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.data.read(), |data| &data[PAGE_HEADER_SIZE..])
    }

    /// Returns an exclusive guard over the payload bytes.
    pub fn payload_mut(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.data.write(), |data| &mut data[PAGE_HEADER_SIZE..])
    }

    // =========================================================================
    // Checksum
    // =========================================================================

    /// Computes the CRC32 checksum of the page with the checksum field
    /// treated as zero.
    pub fn compute_checksum(&self) -> u32 {
        page_checksum(&self.data.read())
    }

    /// Verifies the stored checksum against the page contents.
    pub fn verify_checksum(&self) -> bool {
        let data = self.data.read();
        let stored: [u8; 4] =
            data[PAGE_CHECKSUM_OFFSET..PAGE_CHECKSUM_OFFSET + 4].try_into().unwrap();
        u32::from_le_bytes(stored) == page_checksum(&data)
    }

    /// Computes the checksum and stores it in the header.
    pub fn update_checksum(&self) {
        let mut data = self.data.write();
        PageHeader::new(&mut data).update_checksum();
    }

    // =========================================================================
    // Reset
    // =========================================================================

    /// Resets the page to its initial state: zeroed buffer, unassigned
    /// ID, clean, unpinned.
    pub fn reset(&self) {
        {
            let mut data = self.data.write();
            data.fill(0);
            PageHeader::new(&mut data).initialize(PageId::new(0));
        }
        self.id.store(PageId::INVALID.as_u32(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }

    /// Resets the page and assigns a new ID.
    pub fn reset_to(&self, id: PageId) {
        self.reset();
        self.set_id(id);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id())
            .field("pin_count", &self.pin_count())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
