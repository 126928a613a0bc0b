//! Helpers for binary decoding, string conversion and timestamps.

use crate::error::{RegistryError, Result};
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use encoding_rs::UTF_16LE;

/// Offset where hive bins start (after the base block).
pub const HBIN_START_OFFSET: u32 = 0x1000;

/// Offset of the header checksum field.
pub const CHECKSUM_OFFSET: usize = 0x1FC;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

/// Decodes a Latin-1 ("compressed") name, trimming trailing nulls.
///
/// Compressed key and value names store one byte per character.
pub fn read_ascii_string(data: &[u8]) -> String {
    data.iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim_end_matches('\0')
        .to_string()
}

/// Decodes UTF-16LE text leniently.
///
/// Invalid sequences become U+FFFD, a dangling odd byte is dropped and
/// trailing nulls are trimmed. Corrupt string data never fails a read.
pub fn read_utf16_lossy(data: &[u8]) -> String {
    let even = &data[..data.len() - data.len() % 2];
    let (decoded, _had_errors) = UTF_16LE.decode_without_bom_handling(even);
    decoded.trim_end_matches('\0').to_string()
}

/// Decodes a null-terminated UTF-16LE field, stopping at the first null.
pub fn read_utf16_until_null(data: &[u8]) -> String {
    let end = data
        .chunks_exact(2)
        .position(|unit| unit == [0, 0])
        .map(|units| units * 2)
        .unwrap_or(data.len());
    read_utf16_lossy(&data[..end])
}

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    match data.get(offset..offset.saturating_add(4)) {
        Some(bytes) if bytes.len() == 4 => Ok(LittleEndian::read_u32(bytes)),
        _ => Err(RegistryError::TruncatedData {
            offset: offset as u32,
            expected: 4,
            actual: data.len().saturating_sub(offset),
        }),
    }
}

/// Reads a u16 from a byte slice at the given offset.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    match data.get(offset..offset.saturating_add(2)) {
        Some(bytes) if bytes.len() == 2 => Ok(LittleEndian::read_u16(bytes)),
        _ => Err(RegistryError::TruncatedData {
            offset: offset as u32,
            expected: 2,
            actual: data.len().saturating_sub(offset),
        }),
    }
}

/// Reads a u64 from a byte slice at the given offset.
pub fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    match data.get(offset..offset.saturating_add(8)) {
        Some(bytes) if bytes.len() == 8 => Ok(LittleEndian::read_u64(bytes)),
        _ => Err(RegistryError::TruncatedData {
            offset: offset as u32,
            expected: 8,
            actual: data.len().saturating_sub(offset),
        }),
    }
}

/// Calculates the XOR checksum over the first 508 bytes of the base block.
pub fn calculate_checksum(data: &[u8]) -> u32 {
    data.chunks_exact(4)
        .take(CHECKSUM_OFFSET / 4)
        .fold(0u32, |acc, dword| acc ^ LittleEndian::read_u32(dword))
}

/// Converts a Windows FILETIME into a UTC timestamp.
///
/// Zero means "never written" and yields `None`.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let seconds = (filetime / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
    let nanos = ((filetime % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos)
}

/// Converts a relative cell offset to an absolute file offset.
///
/// Cell offsets are relative to the first hbin (at 0x1000).
///
/// # Errors
///
/// Returns `RegistryError::InvalidOffset` if the addition would overflow.
#[inline]
pub fn cell_offset_to_absolute(cell_offset: u32) -> Result<u32> {
    cell_offset
        .checked_add(HBIN_START_OFFSET)
        .ok_or(RegistryError::InvalidOffset {
            offset: cell_offset,
            hive_size: 0,
        })
}

/// Folds a key or value name for case-insensitive comparison.
///
/// Each character is replaced by its uppercase form only when that form is
/// a single character, so `ß` stays `ß` and never becomes `SS`. Two names
/// are the same registry name exactly when their folds are equal.
pub fn fold_name(name: &str) -> String {
    name.chars().map(fold_char).collect()
}

/// Compares two names the way the registry does.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.chars().map(fold_char).eq(b.chars().map(fold_char))
}

fn fold_char(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(single), None) => single,
        _ => c,
    }
}
