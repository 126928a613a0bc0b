//! Big data block (db) decoding.
//!
//! Values larger than 16,344 bytes are split into segments. The db record
//! points at a list of segment cells; each contributes at most 16,344
//! bytes, the rest of a segment cell being padding.

use crate::cell::{Cell, CellType};
use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le};

/// Largest value stored directly in a single data cell.
pub const MAX_DIRECT_DATA_SIZE: u32 = 16_344;

/// Big data block header.
///
/// ```text
/// Offset  Size  Description
/// 0x00    2     Signature ("db")
/// 0x02    2     Number of segments
/// 0x04    4     Offset to segment list
/// ```
#[derive(Debug, Clone)]
pub struct BigDataBlock {
    /// Number of data segments.
    pub segment_count: u16,

    /// Cell offset of the list of segment offsets.
    pub segment_list_offset: u32,
}

impl BigDataBlock {
    const MIN_SIZE: usize = 8;

    /// Decodes a big data header cell.
    pub fn parse(cell: &Cell) -> Result<Self> {
        if cell.data.len() < Self::MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset: cell.offset,
                expected: Self::MIN_SIZE,
                actual: cell.data.len(),
            });
        }
        cell.expect_type(CellType::DataBlock)?;

        Ok(BigDataBlock {
            segment_count: read_u16_le(&cell.data, 0x02)?,
            segment_list_offset: read_u32_le(&cell.data, 0x04)?,
        })
    }

    /// Extracts segment offsets from the segment list cell.
    pub fn segment_offsets(&self, list: &Cell) -> Result<Vec<u32>> {
        let count = self.segment_count as usize;
        let expected = count * 4;
        if list.data.len() < expected {
            return Err(RegistryError::TruncatedData {
                offset: list.offset,
                expected,
                actual: list.data.len(),
            });
        }
        (0..count).map(|i| read_u32_le(&list.data, i * 4)).collect()
    }
}
