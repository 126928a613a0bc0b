//! Subkey list decoding (lf, lh, li, ri).
//!
//! Leaf lists hold key node offsets directly; an index root holds offsets
//! of further leaf lists.

use crate::cell::{Cell, CellType};
use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le};

/// Parsed subkey list.
#[derive(Debug, Clone)]
pub struct SubkeyList {
    /// Which list format the cell used.
    pub list_type: CellType,

    /// Key node offsets for leaves, sublist offsets for an index root.
    pub offsets: Vec<u32>,
}

impl SubkeyList {
    /// Decodes a subkey list cell.
    ///
    /// The declared element count is checked against the cell size before
    /// anything is read, so a corrupt count cannot cause a large allocation.
    pub fn parse(cell: &Cell) -> Result<Self> {
        let data = &cell.data;
        let list_type = match cell.cell_type() {
            Some(t) if t.is_subkey_list() => t,
            _ => {
                let mut sig = [0u8; 2];
                for (dst, src) in sig.iter_mut().zip(data.iter()) {
                    *dst = *src;
                }
                return Err(RegistryError::InvalidSubkeyList {
                    list_type: sig,
                    offset: cell.offset,
                });
            }
        };

        let count = read_u16_le(data, 0x02)? as usize;

        // lf/lh entries carry a 4-byte name hint after each offset
        let stride = match list_type {
            CellType::FastLeaf | CellType::HashLeaf => 8,
            _ => 4,
        };

        let expected_size = 4 + count * stride;
        if data.len() < expected_size {
            return Err(RegistryError::TruncatedData {
                offset: cell.offset,
                expected: expected_size,
                actual: data.len(),
            });
        }

        let offsets = (0..count)
            .map(|i| read_u32_le(data, 4 + i * stride))
            .collect::<Result<Vec<_>>>()?;

        Ok(SubkeyList { list_type, offsets })
    }

    /// Returns true if this is an index root (contains sublists).
    pub fn is_index_root(&self) -> bool {
        self.list_type == CellType::IndexRoot
    }

    /// Returns the number of entries in this list.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true if this list is empty.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
