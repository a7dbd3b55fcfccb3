//! WAL segment files.
//!
//! Segments are named `wal_NNNNNNNN.log` (eight zero-padded decimal
//! digits) and strictly ordered by ID; the current segment is the
//! highest-numbered one. This module handles naming, enumeration, and
//! the forward scan that finds the last valid record in a segment.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use strata_common::constants::{
    LOG_RECORD_HEADER_SIZE, WAL_SEGMENT_DIGITS, WAL_SEGMENT_PREFIX, WAL_SEGMENT_SUFFIX,
};
use strata_common::types::Lsn;

use crate::error::WalResult;
use crate::record::{LogRecord, LogRecordHeader};

/// Result of scanning a segment for valid records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentScan {
    /// LSN of the last valid record, if the segment holds any.
    pub last_lsn: Option<Lsn>,
    /// Byte length of the valid prefix; anything past this is a torn
    /// tail or preallocated space.
    pub valid_len: u64,
}

/// Builds the file name for a segment ID.
pub fn segment_file_name(segment_id: u64) -> String {
    let digits = WAL_SEGMENT_DIGITS;
    format!("{WAL_SEGMENT_PREFIX}{segment_id:0digits$}{WAL_SEGMENT_SUFFIX}")
}

/// Parses a segment ID out of a file path, or `None` if the name does
/// not match the `wal_NNNNNNNN.log` pattern.
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let digits = name
        .strip_prefix(WAL_SEGMENT_PREFIX)?
        .strip_suffix(WAL_SEGMENT_SUFFIX)?;
    if digits.len() != WAL_SEGMENT_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Enumerates the segment IDs present in `dir`, sorted ascending.
pub fn find_segments(dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut segments = Vec::new();
    if !dir.exists() {
        return Ok(segments);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(segment_id) = parse_segment_id(&entry.path()) {
            segments.push(segment_id);
        }
    }

    segments.sort_unstable();
    Ok(segments)
}

/// Walks a segment from the front, record by record, and reports the
/// last valid record.
///
/// The scan stops at the first structural or checksum failure: by the
/// torn-tail rule, that record and everything after it are discarded.
pub fn scan_segment(path: &Path) -> WalResult<SegmentScan> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut last_lsn = None;
    let mut pos = 0u64;
    let mut header_buf = [0u8; LOG_RECORD_HEADER_SIZE];

    while pos + LOG_RECORD_HEADER_SIZE as u64 <= file_len {
        if reader.read_exact(&mut header_buf).is_err() {
            break;
        }

        let header = match LogRecordHeader::decode(&mut &header_buf[..]) {
            Ok(header) => header,
            Err(_) => break,
        };

        let length = header.length as u64;
        if length < LOG_RECORD_HEADER_SIZE as u64 || pos + length > file_len {
            break;
        }

        let data_len = (length as usize) - LOG_RECORD_HEADER_SIZE;
        let mut record_buf = Vec::with_capacity(length as usize);
        record_buf.extend_from_slice(&header_buf);
        record_buf.resize(length as usize, 0);
        if reader.read_exact(&mut record_buf[LOG_RECORD_HEADER_SIZE..]).is_err() {
            break;
        }
        debug_assert_eq!(record_buf.len() - LOG_RECORD_HEADER_SIZE, data_len);

        match LogRecord::deserialize(&record_buf) {
            Ok(record) => {
                last_lsn = Some(record.header.lsn);
                pos += length;
            }
            Err(_) => break,
        }
    }

    Ok(SegmentScan {
        last_lsn,
        valid_len: pos,
    })
}
