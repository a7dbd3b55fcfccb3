//! Log record types.

use std::fmt;

/// Type tag of a WAL record.
///
/// Only the checkpoint and transaction variants carry semantic
/// obligations inside the storage core; the data-operation variants are
/// passthrough envelopes for the layers above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogRecordType {
    /// Unused sentinel.
    Invalid = 0,

    /// Row inserted into a page.
    Insert = 1,
    /// Row updated in place.
    Update = 2,
    /// Row deleted from a page.
    Delete = 3,

    /// Page allocated.
    PageAlloc = 10,
    /// Page freed.
    PageFree = 11,
    /// Page initialized.
    PageInit = 12,

    /// Transaction started.
    TxnBegin = 20,
    /// Transaction committed. Forced to stable storage before the
    /// append returns.
    TxnCommit = 21,
    /// Transaction aborted.
    TxnAbort = 22,
    /// Transaction prepared (two-phase commit).
    TxnPrepare = 23,

    /// Checkpoint started.
    CheckpointBegin = 30,
    /// Checkpoint completed; its durability marks the checkpoint done.
    CheckpointEnd = 31,

    /// Compensation record written during undo.
    Clr = 40,

    /// Padding / no-op record.
    Noop = 255,
}

impl LogRecordType {
    /// Creates a record type from its raw byte value.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Invalid),
            1 => Some(Self::Insert),
            2 => Some(Self::Update),
            3 => Some(Self::Delete),
            10 => Some(Self::PageAlloc),
            11 => Some(Self::PageFree),
            12 => Some(Self::PageInit),
            20 => Some(Self::TxnBegin),
            21 => Some(Self::TxnCommit),
            22 => Some(Self::TxnAbort),
            23 => Some(Self::TxnPrepare),
            30 => Some(Self::CheckpointBegin),
            31 => Some(Self::CheckpointEnd),
            40 => Some(Self::Clr),
            255 => Some(Self::Noop),
            _ => None,
        }
    }

    /// Returns the raw byte value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true for transaction control records.
    pub const fn is_transaction(self) -> bool {
        matches!(
            self,
            Self::TxnBegin | Self::TxnCommit | Self::TxnAbort | Self::TxnPrepare
        )
    }

    /// Returns true for checkpoint records.
    pub const fn is_checkpoint(self) -> bool {
        matches!(self, Self::CheckpointBegin | Self::CheckpointEnd)
    }

    /// Returns true for data-operation records.
    pub const fn is_data(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

impl fmt::Display for LogRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "INVALID",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::PageAlloc => "PAGE_ALLOC",
            Self::PageFree => "PAGE_FREE",
            Self::PageInit => "PAGE_INIT",
            Self::TxnBegin => "TXN_BEGIN",
            Self::TxnCommit => "TXN_COMMIT",
            Self::TxnAbort => "TXN_ABORT",
            Self::TxnPrepare => "TXN_PREPARE",
            Self::CheckpointBegin => "CHECKPOINT_BEGIN",
            Self::CheckpointEnd => "CHECKPOINT_END",
            Self::Clr => "CLR",
            Self::Noop => "NOOP",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LogRecordType; 15] = [
        LogRecordType::Invalid,
        LogRecordType::Insert,
        LogRecordType::Update,
        LogRecordType::Delete,
        LogRecordType::PageAlloc,
        LogRecordType::PageFree,
        LogRecordType::PageInit,
        LogRecordType::TxnBegin,
        LogRecordType::TxnCommit,
        LogRecordType::TxnAbort,
        LogRecordType::TxnPrepare,
        LogRecordType::CheckpointBegin,
        LogRecordType::CheckpointEnd,
        LogRecordType::Clr,
        LogRecordType::Noop,
    ];

    #[test]
    fn test_byte_roundtrip() {
        for record_type in ALL {
            assert_eq!(
                LogRecordType::from_u8(record_type.as_u8()),
                Some(record_type)
            );
        }
    }

    #[test]
    fn test_unknown_byte_rejected() {
        assert_eq!(LogRecordType::from_u8(99), None);
        assert_eq!(LogRecordType::from_u8(4), None);
    }

    #[test]
    fn test_classification() {
        assert!(LogRecordType::TxnCommit.is_transaction());
        assert!(LogRecordType::CheckpointEnd.is_checkpoint());
        assert!(LogRecordType::Insert.is_data());
        assert!(!LogRecordType::Noop.is_transaction());
        assert!(!LogRecordType::PageAlloc.is_data());
    }
}
