//! Key node (nk) record decoding.

use crate::cell::{Cell, CellType, KeyNodeFlags, NO_CELL};
use crate::error::{RegistryError, Result};
use crate::utils::{read_ascii_string, read_u16_le, read_u32_le, read_u64_le, read_utf16_lossy};

/// Size of the fixed part of a key node record.
const KEY_NODE_MIN_SIZE: usize = 0x4C;

/// Offset of the key name in the key node record.
const KEY_NAME_OFFSET: usize = 0x4C;

/// Decoded key node record.
///
/// Only the fields needed to walk the tree are kept; security and class
/// name references are not followed.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    /// Flags for this key.
    pub flags: KeyNodeFlags,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Offset to parent key node.
    pub parent_offset: u32,

    /// Number of stable subkeys.
    pub subkey_count: u32,

    /// Offset to the stable subkey list.
    pub subkey_list_offset: u32,

    /// Number of values.
    pub value_count: u32,

    /// Offset to the value list.
    pub value_list_offset: u32,

    /// Key name.
    pub name: String,
}

impl KeyRecord {
    /// Decodes a key node from a cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is wrong or the record is truncated.
    pub fn parse(cell: &Cell) -> Result<Self> {
        let data = &cell.data;
        if data.len() < KEY_NODE_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset: cell.offset,
                expected: KEY_NODE_MIN_SIZE,
                actual: data.len(),
            });
        }
        cell.expect_type(CellType::KeyNode)?;

        let flags = KeyNodeFlags(read_u16_le(data, 0x02)?);
        let name_length = read_u16_le(data, 0x48)? as usize;

        let name_end = KEY_NAME_OFFSET + name_length;
        let name_data = data.get(KEY_NAME_OFFSET..name_end).ok_or(RegistryError::TruncatedData {
            offset: cell.offset,
            expected: name_end,
            actual: data.len(),
        })?;

        let name = if flags.is_compressed() {
            read_ascii_string(name_data)
        } else {
            read_utf16_lossy(name_data)
        };

        Ok(KeyRecord {
            flags,
            last_written: read_u64_le(data, 0x04)?,
            parent_offset: read_u32_le(data, 0x10)?,
            subkey_count: read_u32_le(data, 0x14)?,
            subkey_list_offset: read_u32_le(data, 0x1C)?,
            value_count: read_u32_le(data, 0x24)?,
            value_list_offset: read_u32_le(data, 0x28)?,
            name,
        })
    }

    /// Returns true if this key has subkeys.
    pub fn has_subkeys(&self) -> bool {
        self.subkey_count > 0 && self.subkey_list_offset != NO_CELL
    }

    /// Returns true if this key has values.
    pub fn has_values(&self) -> bool {
        self.value_count > 0 && self.value_list_offset != NO_CELL
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.flags.is_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nk_cell(flags: u16, name: &[u8]) -> Cell {
        let mut data = vec![0u8; KEY_NODE_MIN_SIZE];
        data[0..2].copy_from_slice(b"nk");
        data[0x02..0x04].copy_from_slice(&flags.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&2u32.to_le_bytes());
        data[0x1C..0x20].copy_from_slice(&0x120u32.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&0u32.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&NO_CELL.to_le_bytes());
        data[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(name);
        Cell {
            offset: 0x20,
            allocated: true,
            data,
        }
    }

    #[test]
    fn test_key_node_minimum_size() {
        let cell = Cell {
            offset: 0,
            allocated: true,
            data: vec![0u8; 75],
        };
        assert!(KeyRecord::parse(&cell).is_err());
    }

    #[test]
    fn test_key_node_invalid_signature() {
        let mut cell = nk_cell(KeyNodeFlags::COMP_NAME, b"Services");
        cell.data[0..2].copy_from_slice(b"XX");
        assert!(matches!(KeyRecord::parse(&cell), Err(RegistryError::InvalidFormat(_))));
    }

    #[test]
    fn test_compressed_name() {
        let cell = nk_cell(KeyNodeFlags::COMP_NAME | KeyNodeFlags::ROOT_KEY, b"ROOT");
        let key = KeyRecord::parse(&cell).unwrap();
        assert_eq!(key.name, "ROOT");
        assert!(key.is_root());
        assert!(key.has_subkeys());
        assert!(!key.has_values());
    }

    #[test]
    fn test_utf16_name() {
        let name: Vec<u8> = "Dienste"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let key = KeyRecord::parse(&nk_cell(0, &name)).unwrap();
        assert_eq!(key.name, "Dienste");
    }

    #[test]
    fn test_name_length_past_cell() {
        let mut cell = nk_cell(KeyNodeFlags::COMP_NAME, b"AB");
        cell.data[0x48..0x4A].copy_from_slice(&500u16.to_le_bytes());
        assert!(matches!(KeyRecord::parse(&cell), Err(RegistryError::TruncatedData { .. })));
    }
}
