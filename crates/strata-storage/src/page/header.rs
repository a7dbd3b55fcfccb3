//! Page header view.
//!
//! [`PageHeader`] is a typed view into the first 24 bytes of a page
//! buffer. It provides safe little-endian accessors for every header
//! field; the buffer itself is owned by [`super::Page`] or by the
//! caller (tests, tools).

use strata_common::constants::{PAGE_CHECKSUM_OFFSET, PAGE_HEADER_SIZE, PAGE_PAYLOAD_SIZE};
use strata_common::types::{Lsn, PageId};

use super::checksum::page_checksum;
use super::flags::PageFlags;

/// Mutable view over a page buffer's header.
#[derive(Debug)]
pub struct PageHeader<'a> {
    data: &'a mut [u8],
}

impl<'a> PageHeader<'a> {
    /// Creates a header view over the given page buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than the header.
    #[inline]
    pub fn new(data: &'a mut [u8]) -> Self {
        assert!(
            data.len() >= PAGE_HEADER_SIZE,
            "buffer too small for page header"
        );
        Self { data }
    }

    /// Initializes the header of a freshly reset page.
    pub fn initialize(&mut self, page_id: PageId) {
        self.set_page_id(page_id);
        self.set_lsn(Lsn::INVALID);
        self.set_free_space(PAGE_PAYLOAD_SIZE as u16);
        self.set_flags(PageFlags::empty());
        self.set_checksum(0);
        self.data[20..24].fill(0);
    }

    // =========================================================================
    // Page ID (offset 0, 4 bytes)
    // =========================================================================

    /// Returns the page ID stored in the header.
    #[inline]
    pub fn page_id(&self) -> PageId {
        let bytes: [u8; 4] = self.data[0..4].try_into().unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    /// Sets the page ID.
    #[inline]
    pub fn set_page_id(&mut self, page_id: PageId) {
        self.data[0..4].copy_from_slice(&page_id.as_u32().to_le_bytes());
    }

    // =========================================================================
    // LSN (offset 4, 8 bytes)
    // =========================================================================

    /// Returns the LSN of the last record that modified this page.
    #[inline]
    pub fn lsn(&self) -> Lsn {
        let bytes: [u8; 8] = self.data[4..12].try_into().unwrap();
        Lsn::new(u64::from_le_bytes(bytes))
    }

    /// Sets the page LSN.
    #[inline]
    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.data[4..12].copy_from_slice(&lsn.as_u64().to_le_bytes());
    }

    // =========================================================================
    // Free space (offset 12, 2 bytes)
    // =========================================================================

    /// Returns the advisory free byte count within the payload.
    #[inline]
    pub fn free_space(&self) -> u16 {
        let bytes: [u8; 2] = self.data[12..14].try_into().unwrap();
        u16::from_le_bytes(bytes)
    }

    /// Sets the advisory free byte count.
    #[inline]
    pub fn set_free_space(&mut self, space: u16) {
        self.data[12..14].copy_from_slice(&space.to_le_bytes());
    }

    // =========================================================================
    // Flags (offset 14, 2 bytes)
    // =========================================================================

    /// Returns the flag word.
    #[inline]
    pub fn flags(&self) -> PageFlags {
        let bytes: [u8; 2] = self.data[14..16].try_into().unwrap();
        PageFlags::from_bits(u16::from_le_bytes(bytes))
    }

    /// Sets the flag word.
    #[inline]
    pub fn set_flags(&mut self, flags: PageFlags) {
        self.data[14..16].copy_from_slice(&flags.bits().to_le_bytes());
    }

    // =========================================================================
    // Checksum (offset 16, 4 bytes)
    // =========================================================================

    /// Returns the stored checksum.
    #[inline]
    pub fn checksum(&self) -> u32 {
        let bytes: [u8; 4] =
            self.data[PAGE_CHECKSUM_OFFSET..PAGE_CHECKSUM_OFFSET + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    /// Sets the stored checksum.
    #[inline]
    pub fn set_checksum(&mut self, checksum: u32) {
        self.data[PAGE_CHECKSUM_OFFSET..PAGE_CHECKSUM_OFFSET + 4]
            .copy_from_slice(&checksum.to_le_bytes());
    }

    /// Computes the page checksum and stores it in the header.
    ///
    /// Call this after all other modifications are complete, right
    /// before the page goes to disk.
    pub fn update_checksum(&mut self) {
        let checksum = page_checksum(self.data);
        self.set_checksum(checksum);
    }

    /// Verifies the stored checksum against the page contents.
    pub fn verify_checksum(&self) -> bool {
        self.checksum() == page_checksum(self.data)
    }
}
