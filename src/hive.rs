//! Loaded hive and the key tree decoded from it.

use crate::accessor::{HiveByteAccessor, DEFAULT_MAX_BUFFERED_LEN};
use crate::bigdata::{BigDataBlock, MAX_DIRECT_DATA_SIZE};
use crate::cell::{Cell, NO_CELL};
use crate::error::{RegistryError, Result};
use crate::header::HiveHeader;
use crate::hive_type::HiveType;
use crate::key::KeyRecord;
use crate::subkey_list::SubkeyList;
use crate::tree::{HiveKey, ValueNode};
use crate::utils::{filetime_to_datetime, names_equal, read_u32_le};
use crate::value::ValueRecord;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument};

/// Index roots nest at most one level in valid hives.
const MAX_SUBKEY_LIST_NESTING: usize = 2;

/// How the file bytes are held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backing {
    /// Memory-map the file read-only.
    #[default]
    Mapped,
    /// Read the whole file into a buffer.
    Buffered,
}

/// Options controlling how a hive is loaded.
#[derive(Debug, Clone)]
pub struct HiveOptions {
    /// Storage strategy for the file bytes.
    pub backing: Backing,
    /// Largest file accepted with [`Backing::Buffered`].
    pub max_buffered_len: u64,
    /// Sniff root subkeys when the embedded name does not identify the hive.
    pub classify_by_content: bool,
}

impl Default for HiveOptions {
    fn default() -> Self {
        Self {
            backing: Backing::Mapped,
            max_buffered_len: DEFAULT_MAX_BUFFERED_LEN,
            classify_by_content: true,
        }
    }
}

impl HiveOptions {
    /// Selects the storage strategy.
    pub fn backing(mut self, backing: Backing) -> Self {
        self.backing = backing;
        self
    }

    /// Caps the size of a buffered load.
    pub fn max_buffered_len(mut self, len: u64) -> Self {
        self.max_buffered_len = len;
        self
    }

    /// Enables or disables the root subkey heuristic.
    pub fn classify_by_content(mut self, enabled: bool) -> Self {
        self.classify_by_content = enabled;
        self
    }
}

/// A validated, read-only hive.
///
/// The header and type are decoded once at load time. Key records are
/// decoded lazily while the tree is walked and cached by cell offset; the
/// cache is the only interior state and is guarded by a lock, so a `Hive`
/// can be shared across threads.
pub struct Hive {
    accessor: HiveByteAccessor,
    header: HiveHeader,
    hive_type: HiveType,
    label: String,
    key_cache: RwLock<HashMap<u32, Arc<KeyRecord>>>,
}

impl Hive {
    /// Opens a hive file with default options.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hive_inspect::{Hive, HiveKey};
    ///
    /// let hive = Hive::open("SYSTEM").unwrap();
    /// println!("{} ({})", hive.root_key().unwrap().name(), hive.hive_type());
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &HiveOptions::default())
    }

    /// Opens a hive file.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::FileNotFound`] if the file does not exist
    /// - [`RegistryError::HiveTooSmall`] if it cannot hold a header
    /// - [`RegistryError::FileTooLarge`] if a buffered load exceeds the cap
    /// - [`RegistryError::InvalidSignature`] if it is not a hive
    #[instrument(skip(path, options), fields(path = %path.as_ref().display()))]
    pub fn open_with<P: AsRef<Path>>(path: P, options: &HiveOptions) -> Result<Self> {
        info!("Opening registry hive");
        let path = path.as_ref();
        let accessor = match options.backing {
            Backing::Mapped => HiveByteAccessor::open_mapped(path)?,
            Backing::Buffered => HiveByteAccessor::open_buffered(path, options.max_buffered_len)?,
        };
        Self::from_accessor(accessor, path.display().to_string(), Some(path), options)
    }

    /// Loads a hive from an in-memory image. `label` identifies it in
    /// results and logs.
    pub fn from_vec(data: Vec<u8>, label: impl Into<String>) -> Result<Self> {
        let accessor = HiveByteAccessor::from_vec(data)?;
        Self::from_accessor(accessor, label.into(), None, &HiveOptions::default())
    }

    fn from_accessor(
        accessor: HiveByteAccessor,
        label: String,
        disk_path: Option<&Path>,
        options: &HiveOptions,
    ) -> Result<Self> {
        let header = HiveHeader::read(&accessor)?;
        debug!(
            version = %format!("{}.{}", header.major_version, header.minor_version),
            embedded_name = %header.embedded_file_name,
            "Hive header decoded"
        );

        let mut hive = Self {
            accessor,
            header,
            hive_type: HiveType::Unknown,
            label,
            key_cache: RwLock::new(HashMap::new()),
        };

        let classify_by_content = options.classify_by_content;
        let root_subkey_names = || -> Result<Vec<String>> {
            if !classify_by_content {
                return Err(RegistryError::NotFound("content classification disabled".into()));
            }
            let root = hive.root_key()?;
            Ok(root.subkeys()?.iter().map(|k| k.name().to_string()).collect())
        };
        let hive_type =
            HiveType::detect(&hive.header.embedded_file_name, disk_path, root_subkey_names);
        hive.hive_type = hive_type;

        info!(hive_type = %hive_type, size = hive.accessor.len(), "Hive loaded");
        Ok(hive)
    }

    /// Returns the decoded header.
    pub fn header(&self) -> &HiveHeader {
        &self.header
    }

    /// Returns the classified hive type.
    pub fn hive_type(&self) -> HiveType {
        self.hive_type
    }

    /// Returns the identity label (usually the file path).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.accessor.len()
    }

    /// Returns the bounded byte accessor.
    pub fn accessor(&self) -> &HiveByteAccessor {
        &self.accessor
    }

    /// Returns the root key of the hive.
    pub fn root_key(&self) -> Result<RegistryKey<'_>> {
        let offset = self.header.root_cell_offset;
        let record = self.key_record(offset)?;
        Ok(RegistryKey {
            hive: self,
            offset,
            path: Arc::from(record.name.as_str()),
            record,
        })
    }

    /// Looks up a key by path.
    ///
    /// Components are matched case-insensitively. A leading component equal
    /// to the root key's name is accepted and skipped, so both full paths
    /// (as returned by [`HiveKey::path`]) and root-relative paths work.
    /// Returns `Ok(None)` if a component does not exist.
    pub fn get_key(&self, path: &str) -> Result<Option<RegistryKey<'_>>> {
        let root = self.root_key()?;
        let mut components = path.split('\\').filter(|c| !c.is_empty()).peekable();

        if components
            .peek()
            .map_or(false, |first| names_equal(first, root.name()))
        {
            components.next();
        }

        let mut current = root;
        for component in components {
            let next = current
                .subkeys()?
                .into_iter()
                .find(|k| names_equal(k.name(), component));
            match next {
                Some(key) => current = key,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn key_record(&self, offset: u32) -> Result<Arc<KeyRecord>> {
        if let Some(record) = self
            .key_cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&offset)
        {
            return Ok(Arc::clone(record));
        }

        let record = Arc::new(KeyRecord::parse(&self.read_cell(offset)?)?);
        self.key_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(offset, Arc::clone(&record));
        Ok(record)
    }

    fn read_cell(&self, offset: u32) -> Result<Cell> {
        Cell::read(&self.accessor, offset)
    }

    /// Collects key offsets from a subkey list, following index roots.
    fn collect_subkey_offsets(
        &self,
        list_offset: u32,
        nesting: usize,
        out: &mut Vec<u32>,
    ) -> Result<()> {
        if list_offset == NO_CELL || list_offset == 0 {
            return Ok(());
        }
        if nesting > MAX_SUBKEY_LIST_NESTING {
            return Err(RegistryError::format_error(format!(
                "Subkey list nesting too deep at offset {:#x}",
                list_offset
            )));
        }

        let list = SubkeyList::parse(&self.read_cell(list_offset)?)?;
        if list.is_index_root() {
            for sublist in list.offsets {
                self.collect_subkey_offsets(sublist, nesting + 1, out)?;
            }
        } else {
            out.extend(list.offsets);
        }
        Ok(())
    }

    /// Reads value data and the slack that follows it in the data cell.
    fn read_value_data(&self, record: &ValueRecord) -> Result<(Vec<u8>, Vec<u8>)> {
        if record.inline {
            return Ok((record.inline_data(), Vec::new()));
        }
        if record.data_length == 0 || record.data_offset == NO_CELL {
            return Ok((Vec::new(), Vec::new()));
        }
        if record.data_length > MAX_DIRECT_DATA_SIZE && self.header.minor_version >= 4 {
            return Ok((self.read_big_data(record)?, Vec::new()));
        }

        let mut payload = self.read_cell(record.data_offset)?.data;
        let declared = record.data_length as usize;
        if payload.len() < declared {
            return Err(RegistryError::TruncatedData {
                offset: record.data_offset,
                expected: declared,
                actual: payload.len(),
            });
        }
        let slack = payload.split_off(declared);
        Ok((payload, slack))
    }

    fn read_big_data(&self, record: &ValueRecord) -> Result<Vec<u8>> {
        let db = BigDataBlock::parse(&self.read_cell(record.data_offset)?)?;
        let list = self.read_cell(db.segment_list_offset)?;
        let expected = record.data_length as usize;

        debug!(
            offset = %format!("{:#x}", record.data_offset),
            segments = db.segment_count,
            "Reading big data block"
        );

        // Each segment contributes at most 16344 bytes; the rest of its cell
        // is padding.
        let mut data = Vec::with_capacity(expected);
        for segment in db.segment_offsets(&list)? {
            let cell = self.read_cell(segment)?;
            let wanted = (expected - data.len()).min(MAX_DIRECT_DATA_SIZE as usize);
            let take = wanted.min(cell.data.len());
            data.extend_from_slice(&cell.data[..take]);
            if data.len() >= expected {
                break;
            }
        }

        if data.len() < expected {
            return Err(RegistryError::TruncatedData {
                offset: record.data_offset,
                expected,
                actual: data.len(),
            });
        }
        data.truncate(expected);
        Ok(data)
    }
}

impl std::fmt::Debug for Hive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hive")
            .field("label", &self.label)
            .field("hive_type", &self.hive_type)
            .field("accessor", &self.accessor)
            .finish()
    }
}

/// A key decoded from a hive file.
#[derive(Clone)]
pub struct RegistryKey<'a> {
    hive: &'a Hive,
    /// Cell offset of this key (relative to first hbin).
    pub offset: u32,
    record: Arc<KeyRecord>,
    path: Arc<str>,
}

impl<'a> RegistryKey<'a> {
    /// Returns the hive this key belongs to.
    pub fn hive(&self) -> &'a Hive {
        self.hive
    }

    /// Returns the decoded nk record.
    pub fn record(&self) -> &KeyRecord {
        &self.record
    }

    /// Returns the declared number of subkeys.
    pub fn subkey_count(&self) -> u32 {
        self.record.subkey_count
    }

    /// Returns the declared number of values.
    pub fn value_count(&self) -> u32 {
        self.record.value_count
    }

    /// Gets a specific value by name (case-insensitive).
    pub fn value(&self, name: &str) -> Result<ValueNode> {
        self.values()?
            .into_iter()
            .find(|v| names_equal(v.name(), name))
            .ok_or_else(|| RegistryError::not_found("value", name))
    }
}

impl<'a> HiveKey for RegistryKey<'a> {
    fn name(&self) -> &str {
        &self.record.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn last_written(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.record.last_written)
    }

    fn values(&self) -> Result<Vec<ValueNode>> {
        if !self.record.has_values() {
            return Ok(Vec::new());
        }

        let list = self.hive.read_cell(self.record.value_list_offset)?;
        let count = self.record.value_count as usize;
        if list.data.len() < count.saturating_mul(4) {
            return Err(RegistryError::TruncatedData {
                offset: self.record.value_list_offset,
                expected: count.saturating_mul(4),
                actual: list.data.len(),
            });
        }

        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let offset = read_u32_le(&list.data, i * 4)?;
            let record = ValueRecord::parse(&self.hive.read_cell(offset)?)?;
            let (raw, slack) = self.hive.read_value_data(&record)?;
            values.push(ValueNode::new(record.name, record.data_type, raw).with_slack(slack));
        }
        Ok(values)
    }

    fn subkeys(&self) -> Result<Vec<Self>> {
        if !self.record.has_subkeys() {
            return Ok(Vec::new());
        }

        let mut offsets = Vec::new();
        self.hive
            .collect_subkey_offsets(self.record.subkey_list_offset, 0, &mut offsets)?;

        let mut seen = HashSet::with_capacity(offsets.len());
        let mut subkeys = Vec::with_capacity(offsets.len());
        for offset in offsets {
            // A list that names the same cell twice would double the subtree
            if offset == self.offset || !seen.insert(offset) {
                continue;
            }
            let record = self.hive.key_record(offset)?;
            let path = Arc::from(format!("{}\\{}", self.path, record.name));
            subkeys.push(RegistryKey {
                hive: self.hive,
                offset,
                record,
                path,
            });
        }
        Ok(subkeys)
    }
}

impl std::fmt::Debug for RegistryKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryKey")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("path", &self.path)
            .finish()
    }
}
