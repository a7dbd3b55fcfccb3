//! WAL record header.
//!
//! The header is a packed 44-byte structure that precedes every record:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0       8   lsn
//!   8       8   txn_id
//!  16       8   prev_lsn
//!  24       4   length       (total record size, header included)
//!  28       4   page_id
//!  32       4   checksum     (CRC32 of the record with this field zeroed)
//!  36       2   offset
//!  38       2   data_length
//!  40       1   type
//!  41       3   reserved
//! ```
//!
//! All multi-byte integers are little-endian.

use bytes::{Buf, BufMut};
use strata_common::constants::LOG_RECORD_HEADER_SIZE;
use strata_common::types::{Lsn, PageId, TxnId};

use super::types::LogRecordType;
use crate::error::{WalError, WalResult};

/// Packed WAL record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordHeader {
    /// LSN assigned to this record at append time.
    pub lsn: Lsn,
    /// Transaction that produced the record (`INVALID` for control
    /// records).
    pub txn_id: TxnId,
    /// Back-pointer to the previous record of the same transaction, or
    /// `INVALID`.
    pub prev_lsn: Lsn,
    /// Total record size including header and payload.
    pub length: u32,
    /// Page the record refers to (`INVALID` for control records).
    pub page_id: PageId,
    /// CRC32 over the record with this field zeroed.
    pub checksum: u32,
    /// Byte offset within the page payload the record refers to.
    pub offset: u16,
    /// Payload length in bytes.
    pub data_length: u16,
    /// Record type tag.
    pub record_type: LogRecordType,
}

impl LogRecordHeader {
    /// Size of the packed header in bytes.
    pub const SIZE: usize = LOG_RECORD_HEADER_SIZE;

    /// Creates a header with sequencing and size fields left for the
    /// WAL to fill in at append time.
    pub fn new(record_type: LogRecordType, txn_id: TxnId) -> Self {
        Self {
            lsn: Lsn::INVALID,
            txn_id,
            prev_lsn: Lsn::INVALID,
            length: Self::SIZE as u32,
            page_id: PageId::INVALID,
            checksum: 0,
            offset: 0,
            data_length: 0,
            record_type,
        }
    }

    /// Encodes the header into `buf` (44 bytes, little-endian).
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.lsn.as_u64());
        buf.put_u64_le(self.txn_id.as_u64());
        buf.put_u64_le(self.prev_lsn.as_u64());
        buf.put_u32_le(self.length);
        buf.put_u32_le(self.page_id.as_u32());
        buf.put_u32_le(self.checksum);
        buf.put_u16_le(self.offset);
        buf.put_u16_le(self.data_length);
        buf.put_u8(self.record_type.as_u8());
        buf.put_slice(&[0u8; 3]);
    }

    /// Decodes a header from `buf`.
    pub fn decode(buf: &mut impl Buf) -> WalResult<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(WalError::corrupted(format!(
                "not enough bytes for record header: {} < {}",
                buf.remaining(),
                Self::SIZE
            )));
        }

        let lsn = Lsn::new(buf.get_u64_le());
        let txn_id = TxnId::new(buf.get_u64_le());
        let prev_lsn = Lsn::new(buf.get_u64_le());
        let length = buf.get_u32_le();
        let page_id = PageId::new(buf.get_u32_le());
        let checksum = buf.get_u32_le();
        let offset = buf.get_u16_le();
        let data_length = buf.get_u16_le();
        let type_byte = buf.get_u8();
        buf.advance(3);

        let record_type = LogRecordType::from_u8(type_byte)
            .ok_or_else(|| WalError::corrupted(format!("unknown record type {type_byte}")))?;

        Ok(Self {
            lsn,
            txn_id,
            prev_lsn,
            length,
            page_id,
            checksum,
            offset,
            data_length,
            record_type,
        })
    }
}
