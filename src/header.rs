//! Hive base block (header) decoding.
//!
//! The base block is the first 4096 bytes (0x1000) of a hive file. Only the
//! signature is mandatory: a hive whose first four bytes are not `regf` is
//! rejected before anything else is parsed. Every other anomaly (checksum,
//! version, sequence numbers) is recorded and logged so that damaged hives
//! can still be inspected.

use crate::accessor::HiveByteAccessor;
use crate::error::{RegistryError, Result};
use crate::utils::{
    calculate_checksum, filetime_to_datetime, read_u32_le, read_u64_le, read_utf16_until_null,
    CHECKSUM_OFFSET,
};
use std::fmt;
use tracing::warn;

/// Size of the base block in bytes.
pub const BASE_BLOCK_SIZE: usize = 4096;

/// Expected signature for a valid registry hive ("regf").
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// The signature interpreted as a little-endian `u32`.
pub const REGF_MAGIC: u32 = 0x6667_6572;

/// Offset of the embedded file name.
const FILE_NAME_OFFSET: usize = 0x30;

/// Length of the file name field (64 UTF-16LE characters).
const FILE_NAME_LENGTH: usize = 128;

/// Decoded hive header.
#[derive(Debug, Clone)]
pub struct HiveHeader {
    /// Signature, always `regf` once decoded.
    pub signature: [u8; 4],

    /// Primary sequence number.
    pub primary_sequence: u32,

    /// Secondary sequence number.
    pub secondary_sequence: u32,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Major version of the hive format.
    pub major_version: u32,

    /// Minor version of the hive format.
    pub minor_version: u32,

    /// File type (0 = primary, 1/2/6 = transaction log variants).
    pub file_type: u32,

    /// File format (1 = direct memory load).
    pub file_format: u32,

    /// Offset to root key cell (relative to first hbin).
    pub root_cell_offset: u32,

    /// Length of hive bins data in bytes.
    pub hive_length: u32,

    /// Original file name recorded by the writer of the hive.
    pub embedded_file_name: String,

    /// Checksum stored in the header.
    pub checksum: u32,

    /// Checksum computed over the header.
    pub calculated_checksum: u32,
}

impl HiveHeader {
    /// Reads and decodes the header through the bounded accessor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidSignature`] if the magic is wrong.
    pub fn read(accessor: &HiveByteAccessor) -> Result<Self> {
        let block = accessor.read_bytes(0, BASE_BLOCK_SIZE as i32);
        Self::parse(&block)
    }

    /// Decodes a header from a base block image.
    ///
    /// Short input is zero-padded to the base block size first, so the only
    /// way this fails is a signature mismatch.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut block = [0u8; BASE_BLOCK_SIZE];
        let available = data.len().min(BASE_BLOCK_SIZE);
        block[..available].copy_from_slice(&data[..available]);

        let magic = read_u32_le(&block, 0x00)?;
        if magic != REGF_MAGIC {
            return Err(RegistryError::invalid_signature(REGF_SIGNATURE, &block[0..4]));
        }

        let file_name_bytes = &block[FILE_NAME_OFFSET..FILE_NAME_OFFSET + FILE_NAME_LENGTH];

        let header = HiveHeader {
            signature: *REGF_SIGNATURE,
            primary_sequence: read_u32_le(&block, 0x04)?,
            secondary_sequence: read_u32_le(&block, 0x08)?,
            last_written: read_u64_le(&block, 0x0C)?,
            major_version: read_u32_le(&block, 0x14)?,
            minor_version: read_u32_le(&block, 0x18)?,
            file_type: read_u32_le(&block, 0x1C)?,
            file_format: read_u32_le(&block, 0x20)?,
            root_cell_offset: read_u32_le(&block, 0x24)?,
            hive_length: read_u32_le(&block, 0x28)?,
            embedded_file_name: read_utf16_until_null(file_name_bytes),
            checksum: read_u32_le(&block, CHECKSUM_OFFSET)?,
            calculated_checksum: calculate_checksum(&block),
        };

        header.log_anomalies();
        Ok(header)
    }

    fn log_anomalies(&self) {
        if !self.is_checksum_valid() {
            warn!(
                stored = %format!("{:#x}", self.checksum),
                calculated = %format!("{:#x}", self.calculated_checksum),
                "Hive header checksum mismatch"
            );
        }
        if !self.is_supported_version() {
            warn!(
                major = self.major_version,
                minor = self.minor_version,
                "Unusual hive format version"
            );
        }
        if !self.is_consistent() {
            warn!(
                primary = self.primary_sequence,
                secondary = self.secondary_sequence,
                "Hive sequence numbers differ, hive may be dirty"
            );
        }
    }

    /// Returns true if the stored checksum matches the header contents.
    pub fn is_checksum_valid(&self) -> bool {
        self.checksum == self.calculated_checksum
    }

    /// Returns true for format versions 1.3 through 1.6.
    pub fn is_supported_version(&self) -> bool {
        self.major_version == 1 && (3..=6).contains(&self.minor_version)
    }

    /// Returns true if the hive is in a consistent state.
    ///
    /// The hive is consistent when primary and secondary sequence numbers match.
    pub fn is_consistent(&self) -> bool {
        self.primary_sequence == self.secondary_sequence
    }

    /// Returns the base name of the embedded file name.
    ///
    /// Writers store paths such as `\??\C:\Windows\System32\config\SYSTEM`;
    /// only the final component identifies the hive.
    pub fn embedded_base_name(&self) -> &str {
        self.embedded_file_name
            .rsplit(&['\\', '/'][..])
            .next()
            .unwrap_or("")
            .trim()
    }

    /// Converts the last written timestamp to a UTC date.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        filetime_to_datetime(self.last_written)
    }
}

impl fmt::Display for HiveHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registry Hive Header:\n\
             - Version: {}.{}\n\
             - Root Cell Offset: {:#x}\n\
             - Hive Length: {} bytes\n\
             - Consistent: {}\n\
             - Checksum Valid: {}\n\
             - File Name: {}",
            self.major_version,
            self.minor_version,
            self.root_cell_offset,
            self.hive_length,
            self.is_consistent(),
            self.is_checksum_valid(),
            self.embedded_file_name
        )
    }
}
