//! Value key (vk) decoding, typed value data and value formatting.
//!
//! [`format_value`] is the one formatting routine used both to decide
//! whether a value changed between two hives and to display it, so the
//! comparison never disagrees with what the user sees.

use crate::cell::{Cell, CellType, ValueType};
use crate::error::{RegistryError, Result};
use crate::utils::{read_ascii_string, read_u16_le, read_u32_le, read_utf16_lossy};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Size of the fixed part of a value key record.
const VALUE_KEY_MIN_SIZE: usize = 0x14;

/// Offset of the value name in the value key record.
const VALUE_NAME_OFFSET: usize = 0x14;

/// High bit of the data length: data is stored in the offset field.
const INLINE_DATA_FLAG: u32 = 0x8000_0000;

/// Value name is stored compressed (Latin-1).
const VALUE_COMP_NAME: u16 = 0x0001;

/// Number of bytes shown before a binary preview is cut off.
pub const BINARY_PREVIEW_BYTES: usize = 32;

/// Number of characters shown before text is cut off.
pub const MAX_DISPLAY_CHARS: usize = 256;

/// Decoded value key record.
#[derive(Debug, Clone)]
pub struct ValueRecord {
    /// Declared length of the value data.
    pub data_length: u32,

    /// True if the data lives in the offset field.
    pub inline: bool,

    /// Offset to the data cell, or the data itself when inline.
    pub data_offset: u32,

    /// Declared value type.
    pub data_type: ValueType,

    /// Value name. Empty for the default value.
    pub name: String,
}

impl ValueRecord {
    /// Decodes a value key from a cell.
    pub fn parse(cell: &Cell) -> Result<Self> {
        let data = &cell.data;
        if data.len() < VALUE_KEY_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset: cell.offset,
                expected: VALUE_KEY_MIN_SIZE,
                actual: data.len(),
            });
        }
        cell.expect_type(CellType::ValueKey)?;

        let name_length = read_u16_le(data, 0x02)? as usize;
        let raw_length = read_u32_le(data, 0x04)?;
        let flags = read_u16_le(data, 0x10)?;

        let name_end = VALUE_NAME_OFFSET + name_length;
        let name_data = data.get(VALUE_NAME_OFFSET..name_end).ok_or(RegistryError::TruncatedData {
            offset: cell.offset,
            expected: name_end,
            actual: data.len(),
        })?;

        let name = if flags & VALUE_COMP_NAME != 0 {
            read_ascii_string(name_data)
        } else {
            read_utf16_lossy(name_data)
        };

        Ok(ValueRecord {
            data_length: raw_length & !INLINE_DATA_FLAG,
            inline: raw_length & INLINE_DATA_FLAG != 0,
            data_offset: read_u32_le(data, 0x08)?,
            data_type: ValueType::from_u32(read_u32_le(data, 0x0C)?),
            name,
        })
    }

    /// Returns the inline data bytes (at most four).
    pub fn inline_data(&self) -> Vec<u8> {
        let len = (self.data_length as usize).min(4);
        self.data_offset.to_le_bytes()[..len].to_vec()
    }
}

/// Typed value data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueData {
    /// Zero-length data.
    None,
    /// REG_SZ text.
    Text(String),
    /// REG_EXPAND_SZ text (unexpanded).
    ExpandText(String),
    /// REG_BINARY data.
    Binary(Vec<u8>),
    /// REG_DWORD.
    Dword(u32),
    /// REG_DWORD_BIG_ENDIAN.
    DwordBigEndian(u32),
    /// REG_QWORD.
    Qword(u64),
    /// REG_MULTI_SZ strings.
    MultiText(Vec<String>),
    /// Any other type, kept as raw bytes.
    Other(Vec<u8>),
}

impl ValueData {
    /// Decodes raw bytes according to the declared type.
    ///
    /// Decoding never fails: short integers are zero-padded, bad UTF-16 is
    /// replaced, and unsupported types are kept as raw bytes.
    pub fn decode(raw: &[u8], value_type: ValueType) -> Self {
        if raw.is_empty() {
            return ValueData::None;
        }

        match value_type {
            ValueType::String => ValueData::Text(read_utf16_lossy(raw)),
            ValueType::ExpandString => ValueData::ExpandText(read_utf16_lossy(raw)),
            ValueType::Binary => ValueData::Binary(raw.to_vec()),
            ValueType::Dword => ValueData::Dword(LittleEndian::read_u32(&padded::<4>(raw))),
            ValueType::DwordBigEndian => {
                ValueData::DwordBigEndian(BigEndian::read_u32(&padded::<4>(raw)))
            }
            ValueType::Qword => ValueData::Qword(LittleEndian::read_u64(&padded::<8>(raw))),
            ValueType::MultiString => ValueData::MultiText(
                read_utf16_lossy(raw)
                    .split('\0')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => ValueData::Other(raw.to_vec()),
        }
    }

    /// Full, untruncated display form.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_inspect::ValueData;
    /// assert_eq!(ValueData::Dword(2).to_display_string(), "0x00000002 (2)");
    /// assert_eq!(ValueData::Binary(vec![0xDE, 0xAD]).to_display_string(), "DE AD");
    /// ```
    pub fn to_display_string(&self) -> String {
        match self {
            ValueData::None => String::new(),
            ValueData::Text(s) | ValueData::ExpandText(s) => s.clone(),
            ValueData::Binary(b) | ValueData::Other(b) => hex_bytes(b),
            ValueData::Dword(d) | ValueData::DwordBigEndian(d) => format!("0x{:08x} ({})", d, d),
            ValueData::Qword(q) => format!("0x{:016x} ({})", q, q),
            ValueData::MultiText(strings) => strings.join(" "),
        }
    }

    /// Re-encodes the data into its on-disk byte form.
    pub fn to_raw_bytes(&self) -> Vec<u8> {
        fn utf16z(s: &str) -> Vec<u8> {
            s.encode_utf16()
                .chain(std::iter::once(0))
                .flat_map(|u| u.to_le_bytes())
                .collect()
        }

        match self {
            ValueData::None => Vec::new(),
            ValueData::Text(s) | ValueData::ExpandText(s) => utf16z(s),
            ValueData::Binary(b) | ValueData::Other(b) => b.clone(),
            ValueData::Dword(d) => d.to_le_bytes().to_vec(),
            ValueData::DwordBigEndian(d) => d.to_be_bytes().to_vec(),
            ValueData::Qword(q) => q.to_le_bytes().to_vec(),
            ValueData::MultiText(strings) => {
                let mut bytes: Vec<u8> = strings.iter().flat_map(|s| utf16z(s)).collect();
                bytes.extend_from_slice(&[0, 0]);
                bytes
            }
        }
    }
}

/// Canonical, bounded rendering of a value.
///
/// Binary payloads show at most [`BINARY_PREVIEW_BYTES`] bytes followed by
/// the total length; text is cut at [`MAX_DISPLAY_CHARS`] characters.
/// Comparison and display both go through this function.
pub fn format_value(data: &ValueData) -> String {
    match data {
        ValueData::Binary(bytes) | ValueData::Other(bytes) => {
            if bytes.len() > BINARY_PREVIEW_BYTES {
                format!(
                    "{} ... ({} bytes)",
                    hex_bytes(&bytes[..BINARY_PREVIEW_BYTES]),
                    bytes.len()
                )
            } else {
                hex_bytes(bytes)
            }
        }
        ValueData::Text(_) | ValueData::ExpandText(_) | ValueData::MultiText(_) => {
            let text = data.to_display_string();
            if text.chars().count() > MAX_DISPLAY_CHARS {
                let cut: String = text.chars().take(MAX_DISPLAY_CHARS).collect();
                format!("{}...", cut)
            } else {
                text
            }
        }
        _ => data.to_display_string(),
    }
}

/// Upper-case hex pairs separated by spaces.
fn hex_bytes(bytes: &[u8]) -> String {
    let encoded = hex::encode_upper(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 2);
    for (i, pair) in encoded.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push(pair[0] as char);
        out.push(pair[1] as char);
    }
    out
}

fn padded<const N: usize>(raw: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    let len = raw.len().min(N);
    buf[..len].copy_from_slice(&raw[..len]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vk_cell(name: &[u8], raw_length: u32, data_offset: u32, data_type: u32) -> Cell {
        let mut data = vec![0u8; VALUE_KEY_MIN_SIZE];
        data[0..2].copy_from_slice(b"vk");
        data[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[0x04..0x08].copy_from_slice(&raw_length.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&data_type.to_le_bytes());
        data[0x10..0x12].copy_from_slice(&VALUE_COMP_NAME.to_le_bytes());
        data.extend_from_slice(name);
        Cell {
            offset: 0x80,
            allocated: true,
            data,
        }
    }

    #[test]
    fn test_value_key_minimum_size() {
        let cell = Cell {
            offset: 0,
            allocated: true,
            data: vec![0u8; 19],
        };
        assert!(ValueRecord::parse(&cell).is_err());
    }

    #[test]
    fn test_value_key_invalid_signature() {
        let mut cell = vk_cell(b"Start", 4, 0, 4);
        cell.data[0..2].copy_from_slice(b"XX");
        assert!(ValueRecord::parse(&cell).is_err());
    }

    #[test]
    fn test_inline_data() {
        let cell = vk_cell(b"Start", 4 | INLINE_DATA_FLAG, 0x0000_0002, 4);
        let vk = ValueRecord::parse(&cell).unwrap();
        assert!(vk.inline);
        assert_eq!(vk.name, "Start");
        assert_eq!(vk.data_length, 4);
        assert_eq!(vk.inline_data(), vec![2, 0, 0, 0]);
        assert_eq!(vk.data_type, ValueType::Dword);
    }

    #[test]
    fn test_default_value_has_empty_name() {
        let vk = ValueRecord::parse(&vk_cell(b"", 0, 0, 1)).unwrap();
        assert!(vk.name.is_empty());
    }

    #[test]
    fn test_decode_is_lenient() {
        assert_eq!(ValueData::decode(&[7], ValueType::Dword), ValueData::Dword(7));
        assert_eq!(ValueData::decode(&[], ValueType::String), ValueData::None);
        assert_eq!(
            ValueData::decode(&[0x41, 0x00, 0x42], ValueType::String),
            ValueData::Text("A".to_string())
        );
        assert_eq!(
            ValueData::decode(&[1, 2], ValueType::ResourceList),
            ValueData::Other(vec![1, 2])
        );
    }

    #[test]
    fn test_multi_string_round_trip_bytes() {
        let data = ValueData::MultiText(vec!["one".into(), "two".into()]);
        let raw = data.to_raw_bytes();
        assert_eq!(ValueData::decode(&raw, ValueType::MultiString), data);
    }

    #[test]
    fn test_format_value_truncates_binary() {
        let data = ValueData::Binary(vec![0xAB; 100]);
        let formatted = format_value(&data);
        assert!(formatted.starts_with("AB AB"));
        assert!(formatted.ends_with("... (100 bytes)"));
    }

    #[test]
    fn test_format_value_truncates_text() {
        let data = ValueData::Text("x".repeat(MAX_DISPLAY_CHARS + 10));
        let formatted = format_value(&data);
        assert_eq!(formatted.chars().count(), MAX_DISPLAY_CHARS + 3);
        assert!(formatted.ends_with("..."));

        let short = ValueData::Text("2".to_string());
        assert_eq!(format_value(&short), "2");
    }
}
