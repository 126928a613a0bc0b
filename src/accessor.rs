//! Bounded random access over raw hive bytes.
//!
//! Hive files collected from live systems are frequently truncated or
//! partially overwritten. Every read through [`HiveByteAccessor`] returns a
//! buffer of exactly the requested length; bytes that fall outside the file
//! are zero-filled instead of producing an error. Decoders built on top of
//! the accessor can therefore treat reads as infallible and judge validity
//! from signatures and checksums.

use crate::error::{RegistryError, Result};
use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Size of the fixed header region every hive starts with.
pub const MIN_HIVE_SIZE: u64 = 4096;

/// Largest buffer the loader will materialize by default.
pub const DEFAULT_MAX_BUFFERED_LEN: u64 = isize::MAX as u64;

/// Backing storage of an accessor.
enum Backing {
    /// Read-only memory-mapped view of the file.
    Mapped(Mmap),
    /// Fully materialized copy of the file.
    Buffered(Arc<Vec<u8>>),
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Mapped(mmap) => mmap,
            Backing::Buffered(data) => data,
        }
    }
}

/// Read-only, bounds-safe view over the bytes of a hive file.
///
/// The accessor is immutable after construction and can be shared between
/// threads for concurrent reads.
pub struct HiveByteAccessor {
    backing: Backing,
    len: u64,
}

impl HiveByteAccessor {
    /// Memory-maps the file at `path`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::FileNotFound`] if the path does not exist
    /// - [`RegistryError::HiveTooSmall`] if the file is shorter than the header
    pub fn open_mapped<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = Self::open_checked(path.as_ref())?;

        // SAFETY: the file is opened read-only, the map lives exactly as long
        // as the accessor, and every access below is bounds-checked against
        // the recorded length.
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(size = mmap.len(), "Memory mapped hive file");

        Ok(Self::from_backing(Backing::Mapped(mmap)))
    }

    /// Reads the whole file at `path` into memory.
    ///
    /// Files longer than `max_len` are rejected with
    /// [`RegistryError::FileTooLarge`] rather than truncated.
    pub fn open_buffered<P: AsRef<Path>>(path: P, max_len: u64) -> Result<Self> {
        let mut file = Self::open_checked(path.as_ref())?;
        let size = file.metadata()?.len();

        if size > max_len || size > DEFAULT_MAX_BUFFERED_LEN {
            return Err(RegistryError::FileTooLarge {
                size,
                maximum: max_len.min(DEFAULT_MAX_BUFFERED_LEN),
            });
        }

        let mut data = Vec::with_capacity(size as usize);
        file.read_to_end(&mut data)?;
        debug!(size = data.len(), "Buffered hive file");

        Ok(Self::from_backing(Backing::Buffered(Arc::new(data))))
    }

    /// Wraps an in-memory hive image.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HiveTooSmall`] if the buffer is shorter than
    /// the header.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        let size = data.len() as u64;
        if size < MIN_HIVE_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size,
                minimum: MIN_HIVE_SIZE,
            });
        }
        Ok(Self::from_backing(Backing::Buffered(Arc::new(data))))
    }

    fn from_backing(backing: Backing) -> Self {
        let len = backing.as_slice().len() as u64;
        Self { backing, len }
    }

    fn open_checked(path: &Path) -> Result<File> {
        if !path.exists() {
            return Err(RegistryError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size < MIN_HIVE_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size,
                minimum: MIN_HIVE_SIZE,
            });
        }

        debug!(size, "Hive file size validated");
        Ok(file)
    }

    /// Returns the length of the underlying file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the underlying file is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the accessor is backed by a memory map.
    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    /// Reads exactly `length` bytes starting at `offset`.
    ///
    /// - `length <= 0` yields an empty buffer.
    /// - An offset outside the file yields `length` zero bytes.
    /// - A range running past the end yields the valid prefix followed by
    ///   zero padding.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_inspect::accessor::HiveByteAccessor;
    /// let mut image = vec![0u8; 4096];
    /// image[4094] = 0xAA;
    /// image[4095] = 0xBB;
    /// let accessor = HiveByteAccessor::from_vec(image).unwrap();
    ///
    /// assert_eq!(accessor.read_bytes(4094, 4), vec![0xAA, 0xBB, 0, 0]);
    /// assert_eq!(accessor.read_bytes(-1, 2), vec![0, 0]);
    /// assert!(accessor.read_bytes(0, 0).is_empty());
    /// ```
    pub fn read_bytes(&self, offset: i64, length: i32) -> Vec<u8> {
        if length <= 0 {
            return Vec::new();
        }

        let length = length as usize;
        let mut buffer = vec![0u8; length];

        if offset < 0 || offset as u64 >= self.len {
            return buffer;
        }

        let start = offset as usize;
        let available = (self.len as usize - start).min(length);
        buffer[..available].copy_from_slice(&self.backing.as_slice()[start..start + available]);
        buffer
    }

    /// Returns a borrowed slice if `[offset, offset + length)` lies entirely
    /// inside the file.
    pub fn slice(&self, offset: u64, length: usize) -> Option<&[u8]> {
        let end = offset.checked_add(length as u64)?;
        if end > self.len {
            return None;
        }
        Some(&self.backing.as_slice()[offset as usize..end as usize])
    }

    /// Reads a little-endian `u16`, zero-padded past EOF.
    pub fn read_u16(&self, offset: i64) -> u16 {
        LittleEndian::read_u16(&self.read_bytes(offset, 2))
    }

    /// Reads a little-endian `u32`, zero-padded past EOF.
    pub fn read_u32(&self, offset: i64) -> u32 {
        LittleEndian::read_u32(&self.read_bytes(offset, 4))
    }

    /// Reads a little-endian `i32`, zero-padded past EOF.
    pub fn read_i32(&self, offset: i64) -> i32 {
        LittleEndian::read_i32(&self.read_bytes(offset, 4))
    }

    /// Reads a little-endian `u64`, zero-padded past EOF.
    pub fn read_u64(&self, offset: i64) -> u64 {
        LittleEndian::read_u64(&self.read_bytes(offset, 8))
    }
}

impl std::fmt::Debug for HiveByteAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiveByteAccessor")
            .field("len", &self.len)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
