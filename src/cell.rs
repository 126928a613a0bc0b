//! Cell framing, record signatures and value type tags.
//!
//! Every record in the hive body lives in a cell: a little-endian `i32`
//! size (negative when allocated) followed by the payload. Cells are read
//! through the bounded accessor; a size that cannot fit in the file is
//! rejected before any buffer is allocated.

use crate::accessor::HiveByteAccessor;
use crate::error::{RegistryError, Result};
use crate::utils::cell_offset_to_absolute;

/// Offset value meaning "no cell".
pub const NO_CELL: u32 = 0xFFFF_FFFF;

/// Record signatures found at the start of cell payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Key node (nk).
    KeyNode,
    /// Value key (vk).
    ValueKey,
    /// Security descriptor (sk).
    Security,
    /// Index leaf (li).
    IndexLeaf,
    /// Fast leaf (lf).
    FastLeaf,
    /// Hash leaf (lh).
    HashLeaf,
    /// Index root (ri).
    IndexRoot,
    /// Big data block (db).
    DataBlock,
}

impl CellType {
    /// Parses a cell type from a 2-byte signature.
    pub fn from_signature(sig: [u8; 2]) -> Option<Self> {
        match &sig {
            b"nk" => Some(CellType::KeyNode),
            b"vk" => Some(CellType::ValueKey),
            b"sk" => Some(CellType::Security),
            b"li" => Some(CellType::IndexLeaf),
            b"lf" => Some(CellType::FastLeaf),
            b"lh" => Some(CellType::HashLeaf),
            b"ri" => Some(CellType::IndexRoot),
            b"db" => Some(CellType::DataBlock),
            _ => None,
        }
    }

    /// Returns the 2-byte signature for this cell type.
    pub fn signature(&self) -> &'static [u8; 2] {
        match self {
            CellType::KeyNode => b"nk",
            CellType::ValueKey => b"vk",
            CellType::Security => b"sk",
            CellType::IndexLeaf => b"li",
            CellType::FastLeaf => b"lf",
            CellType::HashLeaf => b"lh",
            CellType::IndexRoot => b"ri",
            CellType::DataBlock => b"db",
        }
    }

    /// Returns true if this cell type represents a subkey list.
    pub fn is_subkey_list(&self) -> bool {
        matches!(
            self,
            CellType::IndexLeaf | CellType::FastLeaf | CellType::HashLeaf | CellType::IndexRoot
        )
    }
}

/// A cell payload copied out of the hive.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Cell offset relative to the first hbin.
    pub offset: u32,
    /// True if the size field was negative (allocated cell).
    pub allocated: bool,
    /// Payload bytes, excluding the size field.
    pub data: Vec<u8>,
}

impl Cell {
    /// Reads the cell at `offset` (relative to the first hbin).
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidOffset`] if the cell starts outside the file
    /// - [`RegistryError::InvalidCellSize`] if the size field is too small
    /// - [`RegistryError::TruncatedData`] if the cell runs past the end
    pub fn read(accessor: &HiveByteAccessor, offset: u32) -> Result<Self> {
        if offset == NO_CELL {
            return Err(RegistryError::invalid_offset(offset, accessor.len()));
        }
        let absolute = u64::from(cell_offset_to_absolute(offset)?);
        if absolute + 4 > accessor.len() {
            return Err(RegistryError::invalid_offset(offset, accessor.len()));
        }

        let size = accessor.read_i32(absolute as i64);
        let total = size.unsigned_abs() as u64;
        if total < 4 {
            return Err(RegistryError::invalid_cell_size(size, offset));
        }

        let available = accessor.len() - absolute;
        if total > available {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: total as usize,
                actual: available as usize,
            });
        }

        let payload_len = (total - 4) as i32;
        Ok(Cell {
            offset,
            allocated: size < 0,
            data: accessor.read_bytes(absolute as i64 + 4, payload_len),
        })
    }

    /// Returns the record type named by the first two payload bytes.
    pub fn cell_type(&self) -> Option<CellType> {
        match self.data.get(0..2) {
            Some(&[a, b]) => CellType::from_signature([a, b]),
            _ => None,
        }
    }

    /// Verifies that the payload starts with `expected`'s signature.
    pub fn expect_type(&self, expected: CellType) -> Result<()> {
        if self.cell_type() == Some(expected) {
            return Ok(());
        }
        Err(RegistryError::format_error(format!(
            "Expected '{}' signature at offset {:#x}, found {:?}",
            String::from_utf8_lossy(expected.signature()),
            self.offset,
            self.data.get(0..2).unwrap_or(&[])
        )))
    }
}

/// Flags for key nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyNodeFlags(pub u16);

impl KeyNodeFlags {
    /// Key is volatile (not stored on disk).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const HIVE_EXIT: u16 = 0x0002;

    /// Key is the root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Key name is in compressed format (Latin-1).
    pub const COMP_NAME: u16 = 0x0020;

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is compressed.
    pub fn is_compressed(&self) -> bool {
        self.has_flag(Self::COMP_NAME)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }

    /// Returns true if the key is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.has_flag(Self::SYM_LINK)
    }
}

/// Declared value type tag of a registry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueType {
    /// No value type.
    None,
    /// String (null-terminated).
    String,
    /// String with environment variables.
    ExpandString,
    /// Binary data.
    Binary,
    /// 32-bit little-endian integer.
    Dword,
    /// 32-bit big-endian integer.
    DwordBigEndian,
    /// Symbolic link (Unicode).
    Link,
    /// Multiple strings.
    MultiString,
    /// Resource list.
    ResourceList,
    /// Full resource descriptor.
    FullResourceDescriptor,
    /// Resource requirements list.
    ResourceRequirementsList,
    /// 64-bit little-endian integer.
    Qword,
    /// Non-standard type value.
    Unknown(u32),
}

impl ValueType {
    /// Maps a raw type tag. Tags outside 0..=11 are kept as `Unknown`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            _ => ValueType::Unknown(value),
        }
    }

    /// Returns the raw type tag.
    pub fn to_u32(&self) -> u32 {
        match self {
            ValueType::None => 0,
            ValueType::String => 1,
            ValueType::ExpandString => 2,
            ValueType::Binary => 3,
            ValueType::Dword => 4,
            ValueType::DwordBigEndian => 5,
            ValueType::Link => 6,
            ValueType::MultiString => 7,
            ValueType::ResourceList => 8,
            ValueType::FullResourceDescriptor => 9,
            ValueType::ResourceRequirementsList => 10,
            ValueType::Qword => 11,
            ValueType::Unknown(value) => *value,
        }
    }

    /// Returns the name of this value type.
    pub fn name(&self) -> String {
        match self {
            ValueType::None => "REG_NONE".to_string(),
            ValueType::String => "REG_SZ".to_string(),
            ValueType::ExpandString => "REG_EXPAND_SZ".to_string(),
            ValueType::Binary => "REG_BINARY".to_string(),
            ValueType::Dword => "REG_DWORD".to_string(),
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN".to_string(),
            ValueType::Link => "REG_LINK".to_string(),
            ValueType::MultiString => "REG_MULTI_SZ".to_string(),
            ValueType::ResourceList => "REG_RESOURCE_LIST".to_string(),
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR".to_string(),
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST".to_string(),
            ValueType::Qword => "REG_QWORD".to_string(),
            ValueType::Unknown(value) => format!("REG_UNKNOWN_{:#010x}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hive_with_cell(size: i32, payload: &[u8]) -> HiveByteAccessor {
        let mut data = vec![0u8; 0x1000];
        data.extend_from_slice(&size.to_le_bytes());
        data.extend_from_slice(payload);
        HiveByteAccessor::from_vec(data).unwrap()
    }

    #[test]
    fn test_cell_type_signature() {
        assert_eq!(CellType::from_signature(*b"nk"), Some(CellType::KeyNode));
        assert_eq!(CellType::from_signature(*b"XX"), None);
        assert_eq!(CellType::ValueKey.signature(), b"vk");
        assert!(CellType::HashLeaf.is_subkey_list());
        assert!(!CellType::DataBlock.is_subkey_list());
    }

    #[test]
    fn test_read_allocated_cell() {
        let accessor = hive_with_cell(-8, b"lf\0\0");
        let cell = Cell::read(&accessor, 0).unwrap();
        assert!(cell.allocated);
        assert_eq!(cell.data, b"lf\0\0");
        assert_eq!(cell.cell_type(), Some(CellType::FastLeaf));
        assert!(cell.expect_type(CellType::FastLeaf).is_ok());
        assert!(cell.expect_type(CellType::KeyNode).is_err());
    }

    #[test]
    fn test_oversized_cell_rejected() {
        let accessor = hive_with_cell(-0x7FFF_0000, b"nk");
        let result = Cell::read(&accessor, 0);
        assert!(matches!(result, Err(RegistryError::TruncatedData { .. })));
    }

    #[test]
    fn test_tiny_cell_rejected() {
        let accessor = hive_with_cell(-2, b"nk");
        assert!(matches!(
            Cell::read(&accessor, 0),
            Err(RegistryError::InvalidCellSize { size: -2, .. })
        ));
        assert!(Cell::read(&accessor, 0x10_0000).is_err());
        assert!(Cell::read(&accessor, NO_CELL).is_err());
    }

    #[test]
    fn test_key_node_flags() {
        let flags = KeyNodeFlags(KeyNodeFlags::COMP_NAME | KeyNodeFlags::ROOT_KEY);
        assert!(flags.is_compressed());
        assert!(flags.is_root());
        assert!(!flags.is_symlink());
    }

    #[test]
    fn test_value_type_tags() {
        assert_eq!(ValueType::from_u32(4), ValueType::Dword);
        assert_eq!(ValueType::from_u32(999), ValueType::Unknown(999));
        assert_eq!(ValueType::Unknown(999).to_u32(), 999);
        assert_eq!(ValueType::String.name(), "REG_SZ");
    }
}
