//! The write-ahead log manager.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use strata_common::metrics::StorageMetrics;
use strata_common::types::{Lsn, TxnId};

use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::record::{LogRecord, LogRecordType};
use crate::segment::{find_segments, scan_segment};

/// State protected by the write mutex: the open segment and the
/// per-segment LSN bounds used for precise truncation.
struct WalInner {
    /// Current segment file, open for writing.
    file: File,
    /// ID of the current segment.
    segment_id: u64,
    /// Write offset within the current segment.
    offset: u64,
    /// Last LSN written to the current segment.
    last_lsn: Lsn,
    /// Highest LSN in each closed segment, for truncation decisions.
    closed_bounds: BTreeMap<u64, Lsn>,
}

/// Durable, ordered, crash-safe append log partitioned into fixed-size
/// segments.
///
/// A single write mutex serializes appends, forces, rotation, and
/// truncation; LSN assignment happens under it, so LSNs are strictly
/// monotonic. `next_lsn`, `flushed_lsn`, and `total_size` are exposed
/// through atomics for lock-free readers.
pub struct WriteAheadLog {
    /// Configuration (directory, segment size).
    config: WalConfig,
    /// Shared metrics; the WAL publishes its total size here.
    metrics: Arc<StorageMetrics>,
    /// Open-segment state; `None` until `open()` succeeds.
    inner: Mutex<Option<WalInner>>,
    /// Next LSN to assign. Starts at 1.
    next_lsn: AtomicU64,
    /// Every record at or below this LSN is durable.
    flushed_lsn: AtomicU64,
    /// Sum of all segment file sizes in bytes.
    total_size: AtomicU64,
}

impl WriteAheadLog {
    /// Creates a WAL rooted at the configured directory.
    ///
    /// No I/O happens until [`WriteAheadLog::open`] is called.
    pub fn new(config: WalConfig, metrics: Arc<StorageMetrics>) -> Self {
        Self {
            config,
            metrics,
            inner: Mutex::new(None),
            next_lsn: AtomicU64::new(Lsn::FIRST.as_u64()),
            flushed_lsn: AtomicU64::new(Lsn::INVALID.as_u64()),
            total_size: AtomicU64::new(0),
        }
    }

    /// Opens the WAL, creating the directory and segment 0 if nothing
    /// exists yet. Idempotent.
    ///
    /// Existing segments are scanned record-by-record so that `next_lsn`
    /// resumes past the highest valid LSN on disk and each closed
    /// segment's LSN bound is known for later truncation.
    pub fn open(&self) -> WalResult<()> {
        let mut guard = self.inner.lock();
        if guard.is_some() {
            return Ok(());
        }

        self.config
            .validate()
            .map_err(|reason| WalError::corrupted(reason))?;
        std::fs::create_dir_all(&self.config.dir)?;

        let segments = find_segments(&self.config.dir)?;
        let current_id = segments.last().copied().unwrap_or(0);

        let mut max_lsn = Lsn::INVALID;
        let mut current_last = Lsn::INVALID;
        let mut closed_bounds = BTreeMap::new();
        let mut total = 0u64;

        for &segment_id in &segments {
            let path = self.config.segment_path(segment_id);
            total += std::fs::metadata(&path)?.len();

            let scan = scan_segment(&path)?;
            if let Some(last) = scan.last_lsn {
                max_lsn = max_lsn.max(last);
                if segment_id == current_id {
                    current_last = last;
                } else {
                    closed_bounds.insert(segment_id, last);
                }
            }
        }

        let path = self.config.segment_path(current_id);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let offset = file.seek(SeekFrom::End(0))?;

        self.next_lsn
            .store(max_lsn.as_u64() + 1, Ordering::Release);
        self.total_size.store(total, Ordering::Release);
        self.metrics.wal_size.store(total, Ordering::Relaxed);

        *guard = Some(WalInner {
            file,
            segment_id: current_id,
            offset,
            last_lsn: current_last,
            closed_bounds,
        });

        debug!(
            dir = %self.config.dir.display(),
            segment = current_id,
            next_lsn = self.next_lsn.load(Ordering::Relaxed),
            "opened WAL"
        );
        Ok(())
    }

    /// Flushes and closes the WAL. Idempotent; errors during the final
    /// flush are logged and swallowed.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        if let Some(inner) = guard.take() {
            if let Err(err) = inner.file.sync_all() {
                warn!(%err, "failed to sync WAL segment on close");
            }
        }
    }

    /// Returns true if the WAL is open.
    pub fn is_open(&self) -> bool {
        self.inner.lock().is_some()
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Appends a record, assigning it the next LSN.
    ///
    /// The record is written to the current segment, rotating first if
    /// it would cross the segment boundary. A record that cannot fit in
    /// any segment is rejected with [`WalError::RecordTooLarge`].
    pub fn append(&self, record: &LogRecord) -> WalResult<Lsn> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(WalError::NotOpen)?;

        if record.serialized_size() > self.config.segment_size {
            return Err(WalError::record_too_large(
                record.serialized_size(),
                self.config.segment_size,
            ));
        }

        let lsn = Lsn::new(self.next_lsn.fetch_add(1, Ordering::AcqRel));
        let mut to_write = record.clone();
        to_write.header.lsn = lsn;
        let buf = to_write.serialize()?;

        if inner.offset + buf.len() as u64 > self.config.segment_size as u64 {
            self.rotate_segment(inner)?;
        }

        inner.file.write_all(&buf)?;
        inner.offset += buf.len() as u64;
        inner.last_lsn = lsn;

        let total = self
            .total_size
            .fetch_add(buf.len() as u64, Ordering::AcqRel)
            + buf.len() as u64;
        self.metrics.wal_size.store(total, Ordering::Relaxed);

        Ok(lsn)
    }

    /// Flushes OS buffers of the current segment to stable storage and
    /// publishes `flushed_lsn = lsn`.
    pub fn force(&self, lsn: Lsn) -> WalResult<()> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(WalError::NotOpen)?;

        inner
            .file
            .sync_all()
            .map_err(|source| WalError::SyncError { source })?;

        self.flushed_lsn.store(lsn.as_u64(), Ordering::Release);
        Ok(())
    }

    /// Forces everything appended so far.
    pub fn force_all(&self) -> WalResult<()> {
        let last = self.next_lsn.load(Ordering::Acquire).saturating_sub(1);
        self.force(Lsn::new(last))
    }

    // =========================================================================
    // Checkpoint support
    // =========================================================================

    /// Appends a `CheckpointBegin` record and returns its LSN.
    pub fn write_checkpoint_begin(&self) -> WalResult<Lsn> {
        self.append(&LogRecord::new(LogRecordType::CheckpointBegin))
    }

    /// Appends a `CheckpointEnd` record whose `prev_lsn` points at the
    /// matching begin record, then force-flushes.
    ///
    /// The end record's durability is the checkpoint's completion
    /// marker, so this does not return until it is on stable storage.
    pub fn write_checkpoint_end(&self, begin_lsn: Lsn) -> WalResult<Lsn> {
        let record = LogRecord::new(LogRecordType::CheckpointEnd).with_prev_lsn(begin_lsn);
        let lsn = self.append(&record)?;
        self.force(lsn)?;
        Ok(lsn)
    }

    /// Removes closed segments made obsolete by a durable checkpoint.
    ///
    /// A closed segment is deleted only when its highest LSN is strictly
    /// below `begin_lsn`; the current segment and at least one prior
    /// segment are always retained.
    pub fn truncate(&self, begin_lsn: Lsn) -> WalResult<()> {
        if !begin_lsn.is_valid() {
            return Err(WalError::InvalidLsn { lsn: begin_lsn });
        }

        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(WalError::NotOpen)?;

        let mut closed: Vec<u64> = find_segments(&self.config.dir)?
            .into_iter()
            .filter(|&id| id < inner.segment_id)
            .collect();
        // Retain the newest closed segment unconditionally.
        closed.pop();

        let mut freed = 0u64;
        for segment_id in closed {
            let deletable = inner
                .closed_bounds
                .get(&segment_id)
                .is_some_and(|&last| last < begin_lsn);
            if !deletable {
                continue;
            }

            let path = self.config.segment_path(segment_id);
            match std::fs::metadata(&path) {
                Ok(meta) => {
                    std::fs::remove_file(&path)?;
                    freed += meta.len();
                    inner.closed_bounds.remove(&segment_id);
                    debug!(segment = segment_id, "truncated WAL segment");
                }
                Err(_) => continue,
            }
        }

        if freed > 0 {
            let total = self.total_size.fetch_sub(freed, Ordering::AcqRel) - freed;
            self.metrics.wal_size.store(total, Ordering::Relaxed);
        }

        Ok(())
    }

    // =========================================================================
    // Transaction support
    // =========================================================================

    /// Appends a `TxnBegin` record.
    pub fn write_txn_begin(&self, txn_id: TxnId) -> WalResult<Lsn> {
        self.append(&LogRecord::with_txn(LogRecordType::TxnBegin, txn_id))
    }

    /// Appends a `TxnCommit` record and force-flushes before returning:
    /// the commit is durable once this call succeeds.
    pub fn write_txn_commit(&self, txn_id: TxnId) -> WalResult<Lsn> {
        let lsn = self.append(&LogRecord::with_txn(LogRecordType::TxnCommit, txn_id))?;
        self.force(lsn)?;
        Ok(lsn)
    }

    /// Appends a `TxnAbort` record.
    pub fn write_txn_abort(&self, txn_id: TxnId) -> WalResult<Lsn> {
        self.append(&LogRecord::with_txn(LogRecordType::TxnAbort, txn_id))
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Next LSN to be assigned.
    pub fn current_lsn(&self) -> Lsn {
        Lsn::new(self.next_lsn.load(Ordering::Acquire))
    }

    /// Highest LSN known to be durable.
    pub fn flushed_lsn(&self) -> Lsn {
        Lsn::new(self.flushed_lsn.load(Ordering::Acquire))
    }

    /// Total size of all segment files in bytes.
    pub fn size(&self) -> u64 {
        self.total_size.load(Ordering::Acquire)
    }

    /// The WAL configuration.
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Closes the current segment (after syncing it, so closed segments
    /// are always durable) and opens the next one.
    fn rotate_segment(&self, inner: &mut WalInner) -> WalResult<()> {
        inner
            .file
            .sync_all()
            .map_err(|source| WalError::SyncError { source })?;

        if inner.last_lsn.is_valid() {
            inner.closed_bounds.insert(inner.segment_id, inner.last_lsn);
        }

        inner.segment_id += 1;
        inner.offset = 0;
        inner.last_lsn = Lsn::INVALID;

        let path = self.config.segment_path(inner.segment_id);
        inner.file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        debug!(segment = inner.segment_id, "rotated WAL segment");
        Ok(())
    }
}

impl Drop for WriteAheadLog {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("dir", &self.config.dir)
            .field("next_lsn", &self.current_lsn())
            .field("flushed_lsn", &self.flushed_lsn())
            .field("size", &self.size())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment_file_name;
    use bytes::Bytes;
    use std::path::Path;
    use strata_common::constants::LOG_RECORD_HEADER_SIZE;
    use strata_common::types::PageId;
    use tempfile::TempDir;

    fn open_wal(dir: &Path, segment_size: usize) -> WriteAheadLog {
        let config = WalConfig::new(dir).with_segment_size(segment_size);
        let wal = WriteAheadLog::new(config, Arc::new(StorageMetrics::new()));
        wal.open().unwrap();
        wal
    }

    fn insert_record(payload: &'static [u8]) -> LogRecord {
        LogRecord::with_data(
            LogRecordType::Insert,
            TxnId::new(1),
            PageId::new(0),
            0,
            Bytes::from_static(payload),
        )
    }

    #[test]
    fn test_open_creates_segment_zero() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 1024 * 1024);

        assert!(wal.is_open());
        assert!(tmp.path().join(segment_file_name(0)).exists());
        assert_eq!(wal.current_lsn(), Lsn::FIRST);
        assert_eq!(wal.size(), 0);
    }

    #[test]
    fn test_lsn_monotonicity() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 1024 * 1024);

        let first = wal.append(&insert_record(b"a")).unwrap();
        let second = wal.append(&insert_record(b"b")).unwrap();
        let third = wal.append(&insert_record(b"c")).unwrap();

        assert_eq!(second, first.offset(1));
        assert_eq!(third, first.offset(2));
        assert_eq!(wal.current_lsn(), first.offset(3));
    }

    #[test]
    fn test_append_grows_size() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 1024 * 1024);

        wal.append(&insert_record(b"payload")).unwrap();
        assert_eq!(wal.size(), (LOG_RECORD_HEADER_SIZE + 7) as u64);
    }

    #[test]
    fn test_commit_forces() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 1024 * 1024);

        wal.append(&insert_record(b"x")).unwrap();
        let commit_lsn = wal.write_txn_commit(TxnId::new(42)).unwrap();
        assert!(wal.flushed_lsn() >= commit_lsn);
    }

    #[test]
    fn test_force_all() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 1024 * 1024);

        let lsn = wal.append(&insert_record(b"x")).unwrap();
        assert_eq!(wal.flushed_lsn(), Lsn::INVALID);

        wal.force_all().unwrap();
        assert_eq!(wal.flushed_lsn(), lsn);
    }

    #[test]
    fn test_checkpoint_records() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 1024 * 1024);

        let begin = wal.write_checkpoint_begin().unwrap();
        let end = wal.write_checkpoint_end(begin).unwrap();
        assert!(end > begin);
        assert!(wal.flushed_lsn() >= end);

        // The end record carries the begin LSN as its back-pointer.
        let scan = scan_segment(&wal.config().segment_path(0)).unwrap();
        assert_eq!(scan.last_lsn, Some(end));
    }

    #[test]
    fn test_rotation() {
        let tmp = TempDir::new().unwrap();
        // Room for exactly two bare records per segment.
        let wal = open_wal(tmp.path(), 2 * LOG_RECORD_HEADER_SIZE);

        for _ in 0..5 {
            wal.write_txn_begin(TxnId::new(1)).unwrap();
        }

        let segments = find_segments(tmp.path()).unwrap();
        assert_eq!(segments, vec![0, 1, 2]);
    }

    #[test]
    fn test_record_never_straddles_segments() {
        let tmp = TempDir::new().unwrap();
        let segment_size = 2 * LOG_RECORD_HEADER_SIZE + 10;
        let wal = open_wal(tmp.path(), segment_size);

        for _ in 0..4 {
            wal.write_txn_begin(TxnId::new(1)).unwrap();
        }

        // Each segment holds two whole records; none was split at the
        // boundary.
        for id in find_segments(tmp.path()).unwrap() {
            let len = std::fs::metadata(wal.config().segment_path(id)).unwrap().len();
            assert_eq!(len % LOG_RECORD_HEADER_SIZE as u64, 0);
        }
    }

    #[test]
    fn test_oversized_record_rejected() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 4096);

        let record = LogRecord::with_data(
            LogRecordType::Insert,
            TxnId::new(1),
            PageId::new(0),
            0,
            Bytes::from(vec![0u8; 8192]),
        );
        let err = wal.append(&record).unwrap_err();
        assert!(matches!(err, WalError::RecordTooLarge { .. }));

        // The failed append did not burn an LSN.
        assert_eq!(wal.current_lsn(), Lsn::FIRST);
    }

    #[test]
    fn test_reopen_resumes_lsn() {
        let tmp = TempDir::new().unwrap();
        let last;
        {
            let wal = open_wal(tmp.path(), 1024 * 1024);
            wal.append(&insert_record(b"a")).unwrap();
            wal.append(&insert_record(b"b")).unwrap();
            last = wal.write_txn_commit(TxnId::new(1)).unwrap();
        }

        let wal = open_wal(tmp.path(), 1024 * 1024);
        assert_eq!(wal.current_lsn(), last.offset(1));

        let next = wal.append(&insert_record(b"c")).unwrap();
        assert!(next > last);
    }

    #[test]
    fn test_truncate_removes_old_segments() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 2 * LOG_RECORD_HEADER_SIZE);

        // Fill several segments.
        for _ in 0..8 {
            wal.write_txn_begin(TxnId::new(1)).unwrap();
        }
        let begin = wal.write_checkpoint_begin().unwrap();
        wal.write_checkpoint_end(begin).unwrap();

        let before = find_segments(tmp.path()).unwrap();
        assert!(before.len() >= 3);

        wal.truncate(begin).unwrap();
        let after = find_segments(tmp.path()).unwrap();

        // Old segments are gone; the current and its predecessor remain.
        assert!(after.len() >= 2);
        assert!(after.len() < before.len());
        assert!(after.contains(before.last().unwrap()));

        let expected: u64 = after
            .iter()
            .map(|&id| std::fs::metadata(wal.config().segment_path(id)).unwrap().len())
            .sum();
        assert_eq!(wal.size(), expected);
    }

    #[test]
    fn test_truncate_keeps_segments_at_or_past_begin_lsn() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 2 * LOG_RECORD_HEADER_SIZE);

        for _ in 0..6 {
            wal.write_txn_begin(TxnId::new(1)).unwrap();
        }

        // A checkpoint boundary below every record deletes nothing.
        wal.truncate(Lsn::FIRST).unwrap();
        let segments = find_segments(tmp.path()).unwrap();
        assert_eq!(segments, vec![0, 1, 2]);
    }

    #[test]
    fn test_truncate_invalid_lsn() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 1024 * 1024);

        let err = wal.truncate(Lsn::INVALID).unwrap_err();
        assert!(matches!(err, WalError::InvalidLsn { .. }));
    }

    #[test]
    fn test_closed_wal_rejects_appends() {
        let tmp = TempDir::new().unwrap();
        let wal = open_wal(tmp.path(), 1024 * 1024);
        wal.close();

        let err = wal.append(&insert_record(b"x")).unwrap_err();
        assert!(matches!(err, WalError::NotOpen));
    }
}
