//! # Registry Hive Inspection
//!
//! Load, search and compare Windows registry hive files.
//!
//! ## Features
//!
//! - **Bounded reads**: every byte access is clamped to the file; reads past
//!   the end are zero-padded instead of failing
//! - **Hive classification**: hive type from the embedded file name, with
//!   disk name and root-key heuristics as fallback
//! - **Search**: substring and whole-word search over key names, value names
//!   and decoded value data
//! - **Comparison**: structural diff of two hives, parallel over wide
//!   subtrees and cancellable, with results identical to a sequential walk
//! - **Fault isolation**: a corrupt key is skipped; it never aborts a search
//!   or a comparison
//!
//! ## Architecture
//!
//! 1. **Byte accessor** ([`HiveByteAccessor`]): memory-mapped or buffered
//!    file bytes behind a bounds-checked reader
//! 2. **Header** ([`HiveHeader`], [`HiveType`]): base block validation and
//!    classification
//! 3. **Records** (`cell`, `key`, `value`, `subkey_list`, `bigdata`):
//!    decoding of the nk/vk/lf/lh/li/ri/db cells needed to present the tree
//! 4. **Tree** ([`HiveKey`]): the read-only key view shared by hive-backed
//!    keys ([`RegistryKey`]) and in-memory trees ([`MemoryKey`])
//! 5. **Algorithms** ([`KeySearch`], [`HiveComparer`]): generic over
//!    [`HiveKey`]
//! 6. **Session** ([`HiveSession`]): load, look up, search, count, compare
//!
//! ## Binary Layout
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Sequence numbers, timestamp, version
//!   - Root key offset, embedded file name
//!   - Checksum
//!
//! [Hive Bins - 4KB aligned]
//!   [Cells]
//!     [Size - 4 bytes, negative if allocated]
//!     [Data - nk, vk, lf/lh/li/ri, db, ...]
//! ```
//!
//! ## Examples
//!
//! ### Searching a hive
//!
//! ```no_run
//! use hive_inspect::{HiveKey, HiveSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = HiveSession::new();
//! session.load("SYSTEM")?;
//!
//! for hit in session.search_all("ShutdownTime", false, true)? {
//!     println!("{:?} at {}", hit.kind, session.convert_root_path(hit.key.path()));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Comparing two snapshots
//!
//! ```no_run
//! use hive_inspect::{compare_hives, CancellationToken, CompareOptions, Hive};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let before = Hive::open("SOFTWARE.before")?;
//! let after = Hive::open("SOFTWARE.after")?;
//!
//! let result = compare_hives(&before, &after, &CompareOptions::default(), &CancellationToken::new())?;
//! for row in result.flat_differences() {
//!     println!("{} {} {}", row.diff_type, row.path, row.value_name);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod bigdata;
pub mod cell;
pub mod diff;
pub mod error;
pub mod header;
pub mod hive;
pub mod hive_type;
pub mod key;
pub mod search;
pub mod session;
pub mod subkey_list;
pub mod tree;
pub mod utils;
pub mod value;

// Re-export main types for convenience
pub use accessor::HiveByteAccessor;
pub use cell::{CellType, KeyNodeFlags, ValueType};
pub use diff::{
    compare, CancellationToken, CompareOptions, ComparisonResult, DiffType, FlatDifference,
    HiveComparer, KeyDiff, ValueDiff,
};
pub use error::{Cancelled, RegistryError, Result};
pub use header::HiveHeader;
pub use hive::{Backing, Hive, HiveOptions, RegistryKey};
pub use hive_type::HiveType;
pub use search::{
    count_tree, search, HiveStatistics, KeySearch, MatchKind, SearchMatch, SearchOptions,
    SearchReport, SkippedKey, TreeCounts,
};
pub use session::{compare_hives, convert_root_path, spawn_compare, HiveSession};
pub use tree::{HiveKey, MemoryKey, MemoryKeyBuilder, ValueNode};
pub use value::{format_value, ValueData};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
