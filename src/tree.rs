//! The key tree consumed by search and comparison.
//!
//! Search and diff only need a narrow, read-only view of a key: its name,
//! path, timestamp, values and subkeys. [`HiveKey`] captures that view so
//! the algorithms run unchanged over keys decoded from a hive file
//! ([`crate::RegistryKey`]) and over trees assembled in memory
//! ([`MemoryKey`]).
//!
//! Enumerating values or subkeys returns a `Result`: a corrupt record fails
//! only the key it belongs to, and traversals decide how to skip it.

use crate::cell::ValueType;
use crate::error::{RegistryError, Result};
use crate::value::{format_value, ValueData};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Read-only view of one key in a hive tree.
///
/// Implementations must be cheap to clone; search results hold clones of
/// the matching keys.
pub trait HiveKey: Clone + Send + Sync {
    /// Key name (a single path component).
    fn name(&self) -> &str;

    /// Full path from the root, components separated by `\`.
    fn path(&self) -> &str;

    /// Last write time, if recorded.
    fn last_written(&self) -> Option<DateTime<Utc>>;

    /// Values stored directly under this key.
    fn values(&self) -> Result<Vec<ValueNode>>;

    /// Direct subkeys.
    fn subkeys(&self) -> Result<Vec<Self>>;
}

/// A decoded registry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueNode {
    name: String,
    value_type: ValueType,
    data: ValueData,
    raw: Vec<u8>,
    slack: Vec<u8>,
}

impl ValueNode {
    /// Builds a value from its raw payload, decoding it per `value_type`.
    pub fn new(name: impl Into<String>, value_type: ValueType, raw: Vec<u8>) -> Self {
        let data = ValueData::decode(&raw, value_type);
        Self {
            name: name.into(),
            value_type,
            data,
            raw,
            slack: Vec::new(),
        }
    }

    /// Builds a value from typed data, deriving the type tag and raw bytes.
    pub fn from_data(name: impl Into<String>, data: ValueData) -> Self {
        let value_type = match &data {
            ValueData::None => ValueType::None,
            ValueData::Text(_) => ValueType::String,
            ValueData::ExpandText(_) => ValueType::ExpandString,
            ValueData::Binary(_) | ValueData::Other(_) => ValueType::Binary,
            ValueData::Dword(_) => ValueType::Dword,
            ValueData::DwordBigEndian(_) => ValueType::DwordBigEndian,
            ValueData::Qword(_) => ValueType::Qword,
            ValueData::MultiText(_) => ValueType::MultiString,
        };
        Self {
            name: name.into(),
            value_type,
            raw: data.to_raw_bytes(),
            data,
            slack: Vec::new(),
        }
    }

    /// Attaches bytes found after the declared data length.
    pub fn with_slack(mut self, slack: Vec<u8>) -> Self {
        self.slack = slack;
        self
    }

    /// Value name; empty for the default value.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as shown to users, `(Default)` for the unnamed value.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "(Default)"
        } else {
            &self.name
        }
    }

    /// Returns true for the unnamed default value.
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    /// Declared type tag.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Typed data.
    pub fn data(&self) -> &ValueData {
        &self.data
    }

    /// Raw payload, exactly the declared length.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Bytes past the declared length inside the data cell.
    pub fn slack(&self) -> &[u8] {
        &self.slack
    }

    /// Full decoded display form, used for searching.
    pub fn display_string(&self) -> String {
        self.data.to_display_string()
    }

    /// Bounded display form, used for comparison and listing.
    pub fn formatted(&self) -> String {
        format_value(&self.data)
    }
}

/// An immutable key tree held in memory.
///
/// Cloning is cheap: nodes are reference counted.
#[derive(Debug, Clone)]
pub struct MemoryKey(Arc<MemoryKeyInner>);

#[derive(Debug)]
struct MemoryKeyInner {
    name: String,
    path: String,
    last_written: Option<DateTime<Utc>>,
    values: Vec<ValueNode>,
    subkeys: Vec<MemoryKey>,
    unreadable_values: bool,
    unreadable_subkeys: bool,
}

impl MemoryKey {
    /// Starts building a key with the given name.
    pub fn builder(name: impl Into<String>) -> MemoryKeyBuilder {
        MemoryKeyBuilder::new(name)
    }
}

impl HiveKey for MemoryKey {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn path(&self) -> &str {
        &self.0.path
    }

    fn last_written(&self) -> Option<DateTime<Utc>> {
        self.0.last_written
    }

    fn values(&self) -> Result<Vec<ValueNode>> {
        if self.0.unreadable_values {
            return Err(RegistryError::format_error(format!(
                "Value list of '{}' is unreadable",
                self.0.path
            )));
        }
        Ok(self.0.values.clone())
    }

    fn subkeys(&self) -> Result<Vec<Self>> {
        if self.0.unreadable_subkeys {
            return Err(RegistryError::format_error(format!(
                "Subkey list of '{}' is unreadable",
                self.0.path
            )));
        }
        Ok(self.0.subkeys.clone())
    }
}

/// Builder for [`MemoryKey`] trees.
///
/// ```rust
/// use hive_inspect::{HiveKey, MemoryKey, ValueData};
///
/// let root = MemoryKey::builder("Root")
///     .subkey(
///         MemoryKey::builder("Services")
///             .value("Start", ValueData::Dword(2)),
///     )
///     .build();
///
/// let services = &root.subkeys().unwrap()[0];
/// assert_eq!(services.path(), "Root\\Services");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyBuilder {
    name: String,
    last_written: Option<DateTime<Utc>>,
    values: Vec<ValueNode>,
    subkeys: Vec<MemoryKeyBuilder>,
    unreadable_values: bool,
    unreadable_subkeys: bool,
}

impl MemoryKeyBuilder {
    /// Creates a builder for a key named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a value from typed data.
    pub fn value(mut self, name: impl Into<String>, data: ValueData) -> Self {
        self.values.push(ValueNode::from_data(name, data));
        self
    }

    /// Adds a fully constructed value.
    pub fn value_node(mut self, value: ValueNode) -> Self {
        self.values.push(value);
        self
    }

    /// Adds a subkey.
    pub fn subkey(mut self, subkey: MemoryKeyBuilder) -> Self {
        self.subkeys.push(subkey);
        self
    }

    /// Sets the last write time.
    pub fn last_written(mut self, at: DateTime<Utc>) -> Self {
        self.last_written = Some(at);
        self
    }

    /// Makes value enumeration fail, modelling a corrupt value list.
    pub fn unreadable_values(mut self) -> Self {
        self.unreadable_values = true;
        self
    }

    /// Makes subkey enumeration fail, modelling a corrupt subkey list.
    pub fn unreadable_subkeys(mut self) -> Self {
        self.unreadable_subkeys = true;
        self
    }

    /// Finishes the tree, assigning full paths from this key down.
    pub fn build(self) -> MemoryKey {
        self.build_under(None)
    }

    fn build_under(self, parent_path: Option<&str>) -> MemoryKey {
        let path = match parent_path {
            Some(parent) => format!("{}\\{}", parent, self.name),
            None => self.name.clone(),
        };
        let subkeys = self
            .subkeys
            .into_iter()
            .map(|child| child.build_under(Some(&path)))
            .collect();

        MemoryKey(Arc::new(MemoryKeyInner {
            name: self.name,
            path,
            last_written: self.last_written,
            values: self.values,
            subkeys,
            unreadable_values: self.unreadable_values,
            unreadable_subkeys: self.unreadable_subkeys,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_assigned() {
        let root = MemoryKey::builder("Root")
            .subkey(MemoryKey::builder("A").subkey(MemoryKey::builder("B")))
            .build();
        let a = &root.subkeys().unwrap()[0];
        let b = &a.subkeys().unwrap()[0];
        assert_eq!(root.path(), "Root");
        assert_eq!(b.path(), "Root\\A\\B");
    }

    #[test]
    fn test_unreadable_lists() {
        let key = MemoryKey::builder("Broken")
            .unreadable_values()
            .unreadable_subkeys()
            .build();
        assert!(key.values().is_err());
        assert!(key.subkeys().is_err());
    }

    #[test]
    fn test_value_node_from_data() {
        let value = ValueNode::from_data("", ValueData::Text("hello".into()));
        assert!(value.is_default());
        assert_eq!(value.display_name(), "(Default)");
        assert_eq!(value.value_type(), ValueType::String);
        assert_eq!(value.raw().len(), 12);
        assert_eq!(value.display_string(), "hello");
    }

    #[test]
    fn test_value_node_slack() {
        let value = ValueNode::new("Blob", ValueType::Binary, vec![1, 2]).with_slack(vec![9, 9]);
        assert_eq!(value.data(), &ValueData::Binary(vec![1, 2]));
        assert_eq!(value.slack(), &[9, 9]);
        assert_eq!(value.formatted(), "01 02");
    }
}
