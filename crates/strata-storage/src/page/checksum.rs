//! Page checksum utilities.
//!
//! Checksums use standard reflected CRC32 (IEEE 802.3, polynomial
//! `0xEDB88320`, initial value `0xFFFFFFFF`, final XOR `0xFFFFFFFF`),
//! which is exactly what `crc32fast` computes.

use strata_common::constants::PAGE_CHECKSUM_OFFSET;

/// Computes a CRC32 checksum over the given bytes.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Computes the checksum of a full page buffer with the checksum field
/// treated as zero.
///
/// The bytes before the field, four zero bytes in its place, and the
/// bytes after it are hashed in order, so the stored checksum never
/// influences its own value.
pub fn page_checksum(data: &[u8]) -> u32 {
    debug_assert!(data.len() >= PAGE_CHECKSUM_OFFSET + 4);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..PAGE_CHECKSUM_OFFSET]);
    hasher.update(&[0u8; 4]);
    hasher.update(&data[PAGE_CHECKSUM_OFFSET + 4..]);
    hasher.finalize()
}
