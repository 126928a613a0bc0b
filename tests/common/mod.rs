//! Synthetic hive writer for integration tests.
//!
//! Serializes a [`MemoryKey`] tree into a minimal but valid regf image:
//! a base block, one hbin and nk/vk/lf/value-list/data cells. Values of up
//! to four bytes are stored inline; larger payloads get a data cell that
//! also carries the value's slack bytes, and payloads above 16,344 bytes
//! are split into db segments.
//!
//! Names that fit Latin-1 are stored compressed; other names are stored as
//! UTF-16LE without the compressed-name flag.

#![allow(dead_code)]

use hive_inspect::utils::calculate_checksum;
use hive_inspect::{HiveKey, MemoryKey};
use std::collections::HashMap;
use std::path::PathBuf;

pub const BASE_BLOCK_SIZE: usize = 4096;
pub const HBIN_HEADER_SIZE: usize = 32;
pub const NO_CELL: u32 = 0xFFFF_FFFF;

const KEY_COMP_NAME: u16 = 0x0020;
const KEY_ROOT: u16 = 0x0004;
const VALUE_COMP_NAME: u16 = 0x0001;
const INLINE_DATA_FLAG: u32 = 0x8000_0000;
const SEGMENT_SIZE: usize = 16_344;

/// Offset fields inside an nk record, relative to the cell payload.
pub const NK_SUBKEY_LIST: usize = 0x1C;
pub const NK_VALUE_LIST: usize = 0x28;

/// A serialized hive plus the cell offsets of every key, by path.
pub struct HiveImage {
    pub bytes: Vec<u8>,
    pub key_offsets: HashMap<String, u32>,
}

impl HiveImage {
    /// Overwrites a u32 field of the nk record for `path`.
    pub fn patch_key_field(&mut self, path: &str, field: usize, value: u32) {
        let cell = self.key_offsets[path] as usize;
        let at = BASE_BLOCK_SIZE + cell + 4 + field;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrites the first four bytes of the base block.
    pub fn corrupt_signature(&mut self) {
        self.bytes[0..4].copy_from_slice(b"XXXX");
    }

    /// Writes the image to a unique file under the system temp directory.
    pub fn write_temp(&self, file_name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "hive-inspect-tests-{}-{}",
            std::process::id(),
            unique_suffix()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file_name);
        std::fs::write(&path, &self.bytes).unwrap();
        path
    }
}

fn unique_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Serializes `root` with `embedded_name` stored in the header.
pub fn build_hive(embedded_name: &str, root: &MemoryKey) -> HiveImage {
    let mut bin = BinWriter::new();
    let mut key_offsets = HashMap::new();
    let root_offset = bin.write_key(root, true, &mut key_offsets);
    let body = bin.finish();

    let mut bytes = base_block(embedded_name, root_offset, body.len() as u32);
    bytes.extend_from_slice(&body);
    HiveImage { bytes, key_offsets }
}

fn base_block(embedded_name: &str, root_offset: u32, hive_length: u32) -> Vec<u8> {
    let mut block = vec![0u8; BASE_BLOCK_SIZE];
    block[0..4].copy_from_slice(b"regf");
    put_u32(&mut block, 0x04, 1);
    put_u32(&mut block, 0x08, 1);
    put_u32(&mut block, 0x14, 1);
    put_u32(&mut block, 0x18, 5);
    put_u32(&mut block, 0x20, 1);
    put_u32(&mut block, 0x24, root_offset);
    put_u32(&mut block, 0x28, hive_length);

    let name: Vec<u8> = embedded_name
        .encode_utf16()
        .take(63)
        .flat_map(u16::to_le_bytes)
        .collect();
    block[0x30..0x30 + name.len()].copy_from_slice(&name);

    let checksum = calculate_checksum(&block);
    put_u32(&mut block, 0x1FC, checksum);
    block
}

/// Encodes a key or value name, returning the bytes and whether they are
/// compressed (Latin-1).
fn encode_name(name: &str) -> (Vec<u8>, bool) {
    if name.chars().all(|c| (c as u32) <= 0xFF) {
        (name.chars().map(|c| c as u8).collect(), true)
    } else {
        (name.encode_utf16().flat_map(u16::to_le_bytes).collect(), false)
    }
}

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

struct BinWriter {
    data: Vec<u8>,
}

impl BinWriter {
    fn new() -> Self {
        Self {
            data: vec![0u8; HBIN_HEADER_SIZE],
        }
    }

    /// Appends an allocated cell and returns its offset.
    fn alloc(&mut self, payload: &[u8]) -> u32 {
        let offset = self.data.len();
        let total = (payload.len() + 4 + 7) & !7;
        self.data.extend_from_slice(&(-(total as i32)).to_le_bytes());
        self.data.extend_from_slice(payload);
        self.data.resize(offset + total, 0);
        offset as u32
    }

    fn write_key(&mut self, key: &MemoryKey, is_root: bool, offsets: &mut HashMap<String, u32>) -> u32 {
        let subkeys = key.subkeys().unwrap_or_default();
        let values = key.values().unwrap_or_default();

        let child_offsets: Vec<(u32, String)> = subkeys
            .iter()
            .map(|child| (self.write_key(child, false, offsets), child.name().to_string()))
            .collect();

        let subkey_list = if child_offsets.is_empty() {
            NO_CELL
        } else {
            let mut list = Vec::new();
            list.extend_from_slice(b"lf");
            list.extend_from_slice(&(child_offsets.len() as u16).to_le_bytes());
            for (offset, name) in &child_offsets {
                list.extend_from_slice(&offset.to_le_bytes());
                let mut hint = [0u8; 4];
                for (dst, src) in hint.iter_mut().zip(encode_name(name).0) {
                    *dst = src;
                }
                list.extend_from_slice(&hint);
            }
            self.alloc(&list)
        };

        let value_list = if values.is_empty() {
            NO_CELL
        } else {
            let value_offsets: Vec<u32> = values
                .iter()
                .map(|v| self.write_value(v.name(), v.value_type().to_u32(), v.raw(), v.slack()))
                .collect();
            let list: Vec<u8> = value_offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
            self.alloc(&list)
        };

        let mut nk = vec![0u8; 0x4C];
        nk[0..2].copy_from_slice(b"nk");
        let (name, compressed) = encode_name(key.name());
        let flags = if compressed { KEY_COMP_NAME } else { 0 } | if is_root { KEY_ROOT } else { 0 };
        put_u16(&mut nk, 0x02, flags);
        put_u32(&mut nk, 0x10, NO_CELL);
        put_u32(&mut nk, 0x14, child_offsets.len() as u32);
        put_u32(&mut nk, 0x1C, subkey_list);
        put_u32(&mut nk, 0x20, NO_CELL);
        put_u32(&mut nk, 0x24, values.len() as u32);
        put_u32(&mut nk, 0x28, value_list);
        put_u16(&mut nk, 0x48, name.len() as u16);
        nk.extend_from_slice(&name);

        let offset = self.alloc(&nk);
        offsets.insert(key.path().to_string(), offset);
        offset
    }

    fn write_value(&mut self, name: &str, value_type: u32, raw: &[u8], slack: &[u8]) -> u32 {
        let (length, data_offset) = if raw.len() <= 4 && slack.is_empty() {
            let mut inline = [0u8; 4];
            inline[..raw.len()].copy_from_slice(raw);
            (raw.len() as u32 | INLINE_DATA_FLAG, u32::from_le_bytes(inline))
        } else if raw.len() > SEGMENT_SIZE {
            (raw.len() as u32, self.write_big_data(raw))
        } else {
            let mut payload = raw.to_vec();
            payload.extend_from_slice(slack);
            (raw.len() as u32, self.alloc(&payload))
        };

        let mut vk = vec![0u8; 0x14];
        vk[0..2].copy_from_slice(b"vk");
        let (name, compressed) = encode_name(name);
        put_u16(&mut vk, 0x02, name.len() as u16);
        put_u32(&mut vk, 0x04, length);
        put_u32(&mut vk, 0x08, data_offset);
        put_u32(&mut vk, 0x0C, value_type);
        put_u16(&mut vk, 0x10, if compressed { VALUE_COMP_NAME } else { 0 });
        vk.extend_from_slice(&name);
        self.alloc(&vk)
    }

    /// Writes segment cells, the segment list and the db record; returns the
    /// db cell offset.
    fn write_big_data(&mut self, raw: &[u8]) -> u32 {
        let segments: Vec<u32> = raw.chunks(SEGMENT_SIZE).map(|chunk| self.alloc(chunk)).collect();
        let list: Vec<u8> = segments.iter().flat_map(|o| o.to_le_bytes()).collect();
        let list_offset = self.alloc(&list);

        let mut db = vec![0u8; 8];
        db[0..2].copy_from_slice(b"db");
        put_u16(&mut db, 0x02, segments.len() as u16);
        put_u32(&mut db, 0x04, list_offset);
        self.alloc(&db)
    }

    fn finish(mut self) -> Vec<u8> {
        let size = (self.data.len() + 4095) & !4095;
        self.data.resize(size, 0);
        self.data[0..4].copy_from_slice(b"hbin");
        put_u32(&mut self.data, 0x04, 0);
        put_u32(&mut self.data, 0x08, size as u32);
        self.data
    }
}
