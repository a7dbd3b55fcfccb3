//! Disk manager.
//!
//! Presents a page-addressable view of a single data file. Pages live at
//! byte offset `page_id * PAGE_SIZE`; allocation appends, and the file
//! length at steady state is exactly `page_count * PAGE_SIZE`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use strata_common::constants::{DATA_FILE_NAME, PAGE_SIZE};
use strata_common::types::PageId;

use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageHeader};

/// Manages disk I/O for database pages.
///
/// A single mutex serializes all I/O on the file handle. Page
/// allocation uses an atomic counter so that handing out IDs is cheap;
/// only the file-extension step takes the lock.
pub struct DiskManager {
    /// Root data directory.
    data_dir: PathBuf,
    /// Path of the data file (`<data_dir>/data.db`).
    data_path: PathBuf,
    /// Open file handle; `None` until `open()` succeeds.
    file: Mutex<Option<File>>,
    /// Next page ID to hand out. Equals the current page count.
    next_page_id: AtomicU32,
}

impl DiskManager {
    /// Creates a disk manager rooted at the given data directory.
    ///
    /// No I/O happens until [`DiskManager::open`] is called.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let data_path = data_dir.join(DATA_FILE_NAME);
        Self {
            data_dir,
            data_path,
            file: Mutex::new(None),
            next_page_id: AtomicU32::new(0),
        }
    }

    /// Opens (or creates) the data file. Idempotent.
    ///
    /// The data directory is created if absent. The page count is
    /// derived from the file length, which must be a whole number of
    /// pages; anything else is reported as corruption.
    pub fn open(&self) -> StorageResult<()> {
        let mut guard = self.file.lock();
        if guard.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.data_dir)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.data_path)?;

        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::corrupted(format!(
                "data file length {} is not a multiple of the page size",
                len
            )));
        }

        self.next_page_id
            .store((len / PAGE_SIZE as u64) as u32, Ordering::Release);
        *guard = Some(file);

        debug!(path = %self.data_path.display(), pages = self.page_count(), "opened data file");
        Ok(())
    }

    /// Flushes and closes the data file. Idempotent; errors during the
    /// final flush are logged and swallowed.
    pub fn close(&self) {
        let mut guard = self.file.lock();
        if let Some(file) = guard.take() {
            if let Err(err) = file.sync_all() {
                warn!(%err, "failed to sync data file on close");
            }
        }
    }

    /// Returns true if the data file is open.
    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }

    /// Reads the page at `page_id` into `page`.
    ///
    /// On success the page's in-memory ID is set, the dirty flag is
    /// cleared, and the checksum has been verified. A stored checksum
    /// that does not match the contents is reported as
    /// [`StorageError::ChecksumMismatch`]; such a page is never handed
    /// to callers.
    pub fn read_page(&self, page_id: PageId, page: &Page) -> StorageResult<()> {
        let page_count = self.page_count();
        if !page_id.is_valid() || page_id.as_u32() >= page_count {
            return Err(StorageError::InvalidPageId {
                page_id,
                page_count,
            });
        }

        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(StorageError::NotOpen)?;

        let offset = u64::from(page_id.as_u32()) * PAGE_SIZE as u64;
        {
            let mut data = page.data_mut();
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.read_exact(&mut data))
                .map_err(|source| StorageError::ReadError { page_id, source })?;

            let computed = crate::page::page_checksum(&data);
            let header = PageHeader::new(&mut data);
            let stored = header.checksum();
            if stored != computed {
                return Err(StorageError::ChecksumMismatch {
                    page_id,
                    stored,
                    computed,
                });
            }
            if header.page_id() != page_id {
                return Err(StorageError::corrupted(format!(
                    "page {} carries header ID {}",
                    page_id,
                    header.page_id()
                )));
            }
        }

        page.set_id(page_id);
        page.mark_clean();
        Ok(())
    }

    /// Writes `page` to the slot at `page_id`.
    ///
    /// The file is extended if the slot does not exist yet, and the
    /// page's checksum is refreshed in place before the write so the
    /// on-disk copy always carries a correct checksum.
    pub fn write_page(&self, page_id: PageId, page: &Page) -> StorageResult<()> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(StorageError::NotOpen)?;

        Self::ensure_file_size(file, page_id)
            .map_err(|source| StorageError::WriteError { page_id, source })?;

        let offset = u64::from(page_id.as_u32()) * PAGE_SIZE as u64;
        let mut data = page.data_mut();
        PageHeader::new(&mut data).update_checksum();

        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(&data))
            .map_err(|source| StorageError::WriteError { page_id, source })?;

        Ok(())
    }

    /// Allocates a new page ID, extending the data file so the slot
    /// exists on disk. The counter is rolled back on failure.
    pub fn allocate_page(&self) -> StorageResult<PageId> {
        let raw = self.next_page_id.fetch_add(1, Ordering::AcqRel);
        let page_id = PageId::new(raw);
        if !page_id.is_valid() {
            self.next_page_id.fetch_sub(1, Ordering::AcqRel);
            return Err(StorageError::corrupted("page ID space exhausted"));
        }

        let mut guard = self.file.lock();
        let file = match guard.as_mut() {
            Some(file) => file,
            None => {
                self.next_page_id.fetch_sub(1, Ordering::AcqRel);
                return Err(StorageError::NotOpen);
            }
        };

        if let Err(source) = Self::ensure_file_size(file, page_id) {
            self.next_page_id.fetch_sub(1, Ordering::AcqRel);
            return Err(StorageError::WriteError { page_id, source });
        }

        Ok(page_id)
    }

    /// Releases a page slot.
    ///
    /// Currently a no-op: disk slots are not reclaimed. A free list is
    /// a possible future extension.
    pub fn deallocate_page(&self, _page_id: PageId) -> StorageResult<()> {
        Ok(())
    }

    /// Flushes OS buffers for the data file to stable storage.
    pub fn sync(&self) -> StorageResult<()> {
        let guard = self.file.lock();
        let file = guard.as_ref().ok_or(StorageError::NotOpen)?;
        file.sync_all()
            .map_err(|source| StorageError::SyncError { source })
    }

    /// Number of allocated pages.
    pub fn page_count(&self) -> u32 {
        self.next_page_id.load(Ordering::Acquire)
    }

    /// Total data file size in bytes at steady state.
    pub fn file_size(&self) -> u64 {
        u64::from(self.page_count()) * PAGE_SIZE as u64
    }

    /// Data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Extends the file so the slot for `page_id` exists, by writing a
    /// single zero byte at the new end.
    fn ensure_file_size(file: &mut File, page_id: PageId) -> std::io::Result<()> {
        let required = (u64::from(page_id.as_u32()) + 1) * PAGE_SIZE as u64;
        let current = file.metadata()?.len();
        if current < required {
            file.seek(SeekFrom::Start(required - 1))?;
            file.write_all(&[0u8])?;
        }
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskManager")
            .field("data_dir", &self.data_dir)
            .field("page_count", &self.page_count())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_manager(dir: &Path) -> DiskManager {
        let manager = DiskManager::new(dir);
        manager.open().unwrap();
        manager
    }

    #[test]
    fn test_open_creates_file() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(tmp.path());

        assert!(manager.is_open());
        assert_eq!(manager.page_count(), 0);
        assert!(tmp.path().join(DATA_FILE_NAME).exists());

        // Opening again is a no-op.
        manager.open().unwrap();
    }

    #[test]
    fn test_allocate_extends_file() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(tmp.path());

        let first = manager.allocate_page().unwrap();
        let second = manager.allocate_page().unwrap();
        assert_eq!(first, PageId::new(0));
        assert_eq!(second, PageId::new(1));
        assert_eq!(manager.page_count(), 2);

        let len = std::fs::metadata(tmp.path().join(DATA_FILE_NAME))
            .unwrap()
            .len();
        assert_eq!(len, 2 * PAGE_SIZE as u64);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(tmp.path());

        let id = manager.allocate_page().unwrap();
        let page = Page::with_id(id);
        {
            let mut payload = page.payload_mut();
            payload[0..13].copy_from_slice(b"hello, disk!\0");
        }
        manager.write_page(id, &page).unwrap();

        let loaded = Page::new();
        manager.read_page(id, &loaded).unwrap();
        assert_eq!(loaded.id(), id);
        assert!(!loaded.is_dirty());
        assert_eq!(&loaded.payload()[0..13], b"hello, disk!\0");
    }

    #[test]
    fn test_read_out_of_range() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(tmp.path());

        let page = Page::new();
        let err = manager.read_page(PageId::new(10), &page).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPageId { .. }));

        let err = manager.read_page(PageId::INVALID, &page).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPageId { .. }));
    }

    #[test]
    fn test_corrupted_page_detected() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(tmp.path());

        let id = manager.allocate_page().unwrap();
        let page = Page::with_id(id);
        manager.write_page(id, &page).unwrap();
        manager.close();

        // Flip one payload byte on disk.
        let path = tmp.path().join(DATA_FILE_NAME);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[100] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let manager = open_manager(tmp.path());
        let loaded = Page::new();
        let err = manager.read_page(id, &loaded).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_bad_file_length_is_corruption() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(DATA_FILE_NAME), vec![0u8; 100]).unwrap();

        let manager = DiskManager::new(tmp.path());
        let err = manager.open().unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_deallocate_is_noop() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(tmp.path());

        let id = manager.allocate_page().unwrap();
        manager.deallocate_page(id).unwrap();
        assert_eq!(manager.page_count(), 1);
    }

    #[test]
    fn test_sync() {
        let tmp = TempDir::new().unwrap();
        let manager = open_manager(tmp.path());
        manager.sync().unwrap();

        manager.close();
        assert!(matches!(manager.sync(), Err(StorageError::NotOpen)));
    }

    #[test]
    fn test_persists_page_count_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let manager = open_manager(tmp.path());
            for _ in 0..3 {
                manager.allocate_page().unwrap();
            }
        }

        let manager = open_manager(tmp.path());
        assert_eq!(manager.page_count(), 3);
        assert_eq!(manager.allocate_page().unwrap(), PageId::new(3));
    }
}
