//! Error types for hive loading, tree decoding and comparison.
//!
//! Errors fall into three groups:
//!
//! - **Load errors** (missing file, bad signature, oversized file) abort
//!   hive loading and are surfaced to the caller.
//! - **Record errors** (bad offsets, truncated cells, unknown list types)
//!   describe a single corrupt record. Traversals treat them as per-node
//!   failures and skip the affected key.
//! - **Cancellation** is a distinct outcome of a comparison run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while loading or reading a hive.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error occurred while reading the hive file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The hive file does not exist.
    #[error("Hive file not found: {}", path.display())]
    FileNotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// Invalid magic signature in header or structure.
    #[error("Invalid signature: expected {expected:?}, found {found:?}")]
    InvalidSignature {
        /// Expected signature bytes.
        expected: Vec<u8>,
        /// Signature bytes actually present.
        found: Vec<u8>,
    },

    /// Hive is too small to be valid.
    #[error("Hive too small: {size} bytes (minimum: {minimum} bytes)")]
    HiveTooSmall {
        /// Actual size.
        size: u64,
        /// Minimum accepted size.
        minimum: u64,
    },

    /// The file cannot be materialized into a single in-memory buffer.
    #[error("Hive too large to buffer: {size} bytes (maximum: {maximum} bytes)")]
    FileTooLarge {
        /// Actual size.
        size: u64,
        /// Largest buffer the loader will allocate.
        maximum: u64,
    },

    /// Invalid hive format or corrupted data.
    #[error("Invalid hive format: {0}")]
    InvalidFormat(String),

    /// Cell offset is out of bounds.
    #[error("Invalid cell offset: {offset:#x} (hive size: {hive_size:#x})")]
    InvalidOffset {
        /// Offending cell offset.
        offset: u32,
        /// Hive size for context.
        hive_size: u64,
    },

    /// Cell size is invalid or corrupted.
    #[error("Invalid cell size: {size} at offset {offset:#x}")]
    InvalidCellSize {
        /// Raw size field.
        size: i32,
        /// Cell offset.
        offset: u32,
    },

    /// Data truncated or incomplete.
    #[error("Truncated data at offset {offset:#x}: expected {expected} bytes, got {actual} bytes")]
    TruncatedData {
        /// Offset of the record.
        offset: u32,
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Invalid subkey list type.
    #[error("Invalid subkey list type: {list_type:?} at offset {offset:#x}")]
    InvalidSubkeyList {
        /// Signature found in the list cell.
        list_type: [u8; 2],
        /// Cell offset.
        offset: u32,
    },

    /// Key or value not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation needed a loaded hive but none is loaded.
    #[error("No hive loaded")]
    NoHiveLoaded,

    /// The operation was cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Marker error returned by cancellable traversals.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation cancelled")]
pub struct Cancelled;

impl From<Cancelled> for RegistryError {
    fn from(_: Cancelled) -> Self {
        RegistryError::Cancelled
    }
}

impl RegistryError {
    /// Creates an invalid signature error with context.
    pub fn invalid_signature(expected: &[u8], found: &[u8]) -> Self {
        Self::InvalidSignature {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    /// Creates an invalid offset error with context.
    pub fn invalid_offset(offset: u32, hive_size: u64) -> Self {
        Self::InvalidOffset { offset, hive_size }
    }

    /// Creates an invalid cell size error with context.
    pub fn invalid_cell_size(size: i32, offset: u32) -> Self {
        Self::InvalidCellSize { size, offset }
    }

    /// Creates a format error with detailed context.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_inspect::error::RegistryError;
    /// let offset = 0x1000;
    /// let err = RegistryError::format_error(
    ///     format!("Expected 'nk' signature at offset {:#x}", offset)
    /// );
    /// assert!(err.to_string().contains("0x1000"));
    /// ```
    pub fn format_error(message: String) -> Self {
        Self::InvalidFormat(message)
    }

    /// Creates a not found error with context about what was being searched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_inspect::error::RegistryError;
    /// let err = RegistryError::not_found("key", "ControlSet001\\Services");
    /// assert_eq!(err.to_string(), "Not found: key 'ControlSet001\\Services'");
    /// ```
    pub fn not_found(item_type: &str, name: &str) -> Self {
        Self::NotFound(format!("{} '{}'", item_type, name))
    }

    /// Returns true if this error aborts hive loading.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            RegistryError::Io(_)
                | RegistryError::FileNotFound { .. }
                | RegistryError::InvalidSignature { .. }
                | RegistryError::HiveTooSmall { .. }
                | RegistryError::FileTooLarge { .. }
        )
    }

    /// Returns true if this error is a cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RegistryError::Cancelled)
    }
}
