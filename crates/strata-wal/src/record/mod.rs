//! WAL log records.
//!
//! A record is a 44-byte packed header followed by an opaque payload.
//! The header checksum covers the full serialized record with the
//! checksum field zeroed, so any flipped byte is detected on read.

mod header;
mod types;

pub use header::LogRecordHeader;
pub use types::LogRecordType;

use bytes::{BufMut, Bytes, BytesMut};
use strata_common::constants::{LOG_RECORD_CHECKSUM_OFFSET, LOG_RECORD_HEADER_SIZE};
use strata_common::types::{Lsn, PageId, TxnId};

use crate::error::{WalError, WalResult};

/// A complete log record: header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Fixed-size record header.
    pub header: LogRecordHeader,
    /// Opaque payload owned by the upper layer (before/after images).
    pub data: Bytes,
}

impl LogRecord {
    /// Creates a control record with no transaction and no payload.
    pub fn new(record_type: LogRecordType) -> Self {
        Self {
            header: LogRecordHeader::new(record_type, TxnId::INVALID),
            data: Bytes::new(),
        }
    }

    /// Creates a record attributed to a transaction.
    pub fn with_txn(record_type: LogRecordType, txn_id: TxnId) -> Self {
        Self {
            header: LogRecordHeader::new(record_type, txn_id),
            data: Bytes::new(),
        }
    }

    /// Creates a data record carrying a payload for a page.
    pub fn with_data(
        record_type: LogRecordType,
        txn_id: TxnId,
        page_id: PageId,
        offset: u16,
        data: Bytes,
    ) -> Self {
        let mut header = LogRecordHeader::new(record_type, txn_id);
        header.page_id = page_id;
        header.offset = offset;
        Self { header, data }
    }

    /// Sets the back-pointer to the previous record of the same
    /// transaction.
    #[must_use]
    pub fn with_prev_lsn(mut self, prev_lsn: Lsn) -> Self {
        self.header.prev_lsn = prev_lsn;
        self
    }

    /// Total serialized size: header plus payload.
    #[inline]
    pub fn serialized_size(&self) -> usize {
        LOG_RECORD_HEADER_SIZE + self.data.len()
    }

    /// Serializes the record, finalizing `length`, `data_length`, and
    /// the checksum.
    pub fn serialize(&self) -> WalResult<Bytes> {
        if self.data.len() > u16::MAX as usize {
            return Err(WalError::record_too_large(
                self.serialized_size(),
                LOG_RECORD_HEADER_SIZE + u16::MAX as usize,
            ));
        }

        let mut header = self.header;
        header.length = self.serialized_size() as u32;
        header.data_length = self.data.len() as u16;
        header.checksum = 0;

        let mut buf = BytesMut::with_capacity(self.serialized_size());
        header.encode(&mut buf);
        buf.put_slice(&self.data);

        let checksum = crc32fast::hash(&buf);
        buf[LOG_RECORD_CHECKSUM_OFFSET..LOG_RECORD_CHECKSUM_OFFSET + 4]
            .copy_from_slice(&checksum.to_le_bytes());

        Ok(buf.freeze())
    }

    /// Deserializes a record from the front of `buf`, verifying its
    /// structure and checksum.
    ///
    /// Any flipped byte in the serialized form fails here: structural
    /// damage is reported as [`WalError::Corrupted`], content damage as
    /// [`WalError::ChecksumMismatch`].
    pub fn deserialize(buf: &[u8]) -> WalResult<Self> {
        if buf.len() < LOG_RECORD_HEADER_SIZE {
            return Err(WalError::corrupted(format!(
                "buffer too small for record header: {} < {}",
                buf.len(),
                LOG_RECORD_HEADER_SIZE
            )));
        }

        let header = LogRecordHeader::decode(&mut &buf[..LOG_RECORD_HEADER_SIZE])?;

        let length = header.length as usize;
        if length < LOG_RECORD_HEADER_SIZE || length > buf.len() {
            return Err(WalError::corrupted(format!(
                "record length {} outside valid range [{}, {}]",
                length,
                LOG_RECORD_HEADER_SIZE,
                buf.len()
            )));
        }
        if header.data_length as usize != length - LOG_RECORD_HEADER_SIZE {
            return Err(WalError::corrupted(format!(
                "data length {} does not match record length {}",
                header.data_length, header.length
            )));
        }

        // Checksum over the raw bytes with the checksum field zeroed, so
        // damage anywhere in the serialized form is caught.
        let computed = {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&buf[..LOG_RECORD_CHECKSUM_OFFSET]);
            hasher.update(&[0u8; 4]);
            hasher.update(&buf[LOG_RECORD_CHECKSUM_OFFSET + 4..length]);
            hasher.finalize()
        };
        if computed != header.checksum {
            return Err(WalError::ChecksumMismatch {
                lsn: header.lsn,
                stored: header.checksum,
                computed,
            });
        }

        Ok(Self {
            header,
            data: Bytes::copy_from_slice(&buf[LOG_RECORD_HEADER_SIZE..length]),
        })
    }

    /// Computes the record checksum: CRC32 over the serialized header
    /// with the checksum field zeroed, followed by the payload.
    pub fn compute_checksum(&self) -> u32 {
        let mut header = self.header;
        header.checksum = 0;

        let mut head = [0u8; LOG_RECORD_HEADER_SIZE];
        header.encode(&mut &mut head[..]);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&head);
        hasher.update(&self.data);
        hasher.finalize()
    }

    /// Verifies the stored checksum against the record contents.
    pub fn verify_checksum(&self) -> bool {
        self.compute_checksum() == self.header.checksum
    }
}
