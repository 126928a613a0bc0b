//! Structural comparison of two key trees.
//!
//! [`HiveComparer`] walks two trees side by side and produces a
//! [`ComparisonResult`]: a tree of [`KeyDiff`] nodes mirroring the union of
//! both inputs, with per-value [`ValueDiff`] entries and running totals.
//!
//! Wide subtrees near the root are compared on the rayon thread pool. The
//! parallel walk gathers child diffs and sorts them before attaching them to
//! the parent, and all totals go through atomic counters, so the result is
//! identical to a sequential walk of the same inputs.
//!
//! Values are compared on their formatted display form (see
//! [`crate::value::format_value`]) plus their type tag, never on raw bytes.

use crate::cell::ValueType;
use crate::error::Cancelled;
use crate::tree::{HiveKey, ValueNode};
use crate::utils::{fold_name, names_equal};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Subkey unions larger than this are compared in parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 10;

/// Parallel fan-out is only used above this depth.
pub const DEFAULT_MAX_PARALLEL_DEPTH: usize = 3;

/// Depth limit for comparisons.
pub const DEFAULT_MAX_COMPARE_DEPTH: usize = 512;

/// Name used in flattened rows for key-level changes.
pub const KEY_ROW_NAME: &str = "(key)";

/// Classification of a node across two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DiffType {
    /// Present only in the right tree.
    Added,
    /// Present only in the left tree.
    Removed,
    /// Present in both with differing content.
    Modified,
    /// Present in both and equal.
    Unchanged,
}

impl DiffType {
    /// Short display name.
    pub fn name(&self) -> &'static str {
        match self {
            DiffType::Added => "Added",
            DiffType::Removed => "Removed",
            DiffType::Modified => "Modified",
            DiffType::Unchanged => "Unchanged",
        }
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Difference for a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ValueDiff {
    /// Value name; empty for the default value.
    pub name: String,
    /// Change classification.
    pub diff_type: DiffType,
    /// Formatted left value, if present.
    pub left_value: Option<String>,
    /// Formatted right value, if present.
    pub right_value: Option<String>,
    /// Left type tag, if present.
    pub left_type: Option<ValueType>,
    /// Right type tag, if present.
    pub right_type: Option<ValueType>,
}

impl ValueDiff {
    /// Name as shown to users, `(Default)` for the unnamed value.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "(Default)"
        } else {
            &self.name
        }
    }
}

/// Difference for a key and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KeyDiff {
    /// Key name.
    pub name: String,
    /// Full path from the compared root.
    pub path: String,
    /// Classification of the key itself.
    ///
    /// `Modified` means one of the key's own values changed; changes further
    /// down are reflected by [`KeyDiff::has_differences`] only.
    pub diff_type: DiffType,
    /// Value differences, ordered by case-insensitive name.
    pub values: Vec<ValueDiff>,
    /// Subkey differences, ordered by case-insensitive name.
    ///
    /// Empty for added and removed keys.
    pub subkeys: Vec<KeyDiff>,
    /// Set when the values or subkeys of either side could not be read.
    pub unreadable: bool,
}

impl KeyDiff {
    fn new(name: String, path: String, diff_type: DiffType) -> Self {
        Self {
            name,
            path,
            diff_type,
            values: Vec::new(),
            subkeys: Vec::new(),
            unreadable: false,
        }
    }

    /// Returns true if this key, one of its values, or any descendant changed.
    pub fn has_differences(&self) -> bool {
        self.diff_type != DiffType::Unchanged
            || self.values.iter().any(|v| v.diff_type != DiffType::Unchanged)
            || self.subkeys.iter().any(KeyDiff::has_differences)
    }

    /// Finds a descendant by path relative to this node.
    pub fn find(&self, relative_path: &str) -> Option<&KeyDiff> {
        let mut current = self;
        for component in relative_path.split('\\').filter(|c| !c.is_empty()) {
            current = current
                .subkeys
                .iter()
                .find(|k| names_equal(&k.name, component))?;
        }
        Some(current)
    }
}

/// One row of the flattened difference list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlatDifference {
    /// Key path.
    pub path: String,
    /// Value display name, or `(key)` for key-level rows.
    pub value_name: String,
    /// Change classification.
    pub diff_type: DiffType,
    /// Formatted left value.
    pub left_value: Option<String>,
    /// Formatted right value.
    pub right_value: Option<String>,
}

/// Outcome of comparing two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ComparisonResult {
    /// Diff of the two roots.
    pub root: KeyDiff,
    /// Identity of the left input.
    pub left_label: String,
    /// Identity of the right input.
    pub right_label: String,
    /// Keys present only on the right, including descendants.
    pub added_keys: u64,
    /// Keys present only on the left, including descendants.
    pub removed_keys: u64,
    /// Keys present on both sides with at least one changed value.
    pub modified_keys: u64,
    /// Values present only on the right.
    pub added_values: u64,
    /// Values present only on the left.
    pub removed_values: u64,
    /// Values present on both sides with differing content or type.
    pub modified_values: u64,
}

impl ComparisonResult {
    /// Attaches identities of the two inputs.
    pub fn with_labels(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_label = left.into();
        self.right_label = right.into();
        self
    }

    /// Total number of key-level changes.
    pub fn total_key_changes(&self) -> u64 {
        self.added_keys + self.removed_keys + self.modified_keys
    }

    /// Total number of value-level changes.
    pub fn total_value_changes(&self) -> u64 {
        self.added_values + self.removed_values + self.modified_values
    }

    /// Returns true if anything differs.
    pub fn has_differences(&self) -> bool {
        self.root.has_differences()
    }

    /// Flattens the diff tree into rows, parents before children.
    pub fn flat_differences(&self) -> Vec<FlatDifference> {
        let mut rows = Vec::new();
        flatten(&self.root, &mut rows);
        rows
    }

    /// Renders the result as pretty-printed JSON.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn flatten(key: &KeyDiff, rows: &mut Vec<FlatDifference>) {
    if matches!(key.diff_type, DiffType::Added | DiffType::Removed) {
        rows.push(FlatDifference {
            path: key.path.clone(),
            value_name: KEY_ROW_NAME.to_string(),
            diff_type: key.diff_type,
            left_value: None,
            right_value: None,
        });
    }
    for value in key.values.iter().filter(|v| v.diff_type != DiffType::Unchanged) {
        rows.push(FlatDifference {
            path: key.path.clone(),
            value_name: value.display_name().to_string(),
            diff_type: value.diff_type,
            left_value: value.left_value.clone(),
            right_value: value.right_value.clone(),
        });
    }
    for subkey in &key.subkeys {
        flatten(subkey, rows);
    }
}

/// Cooperative cancellation flag shared between a caller and a comparison.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Comparison configuration.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Allow parallel fan-out over wide subtrees.
    pub parallel: bool,
    /// Fan out only when the subkey union has more entries than this.
    pub parallel_threshold: usize,
    /// Fan out only at depths below this.
    pub max_parallel_depth: usize,
    /// Deepest level compared; the roots are depth 0.
    pub max_depth: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            max_parallel_depth: DEFAULT_MAX_PARALLEL_DEPTH,
            max_depth: DEFAULT_MAX_COMPARE_DEPTH,
        }
    }
}

impl CompareOptions {
    /// Options for a purely sequential walk.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// Enables or disables parallel fan-out.
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Sets the fan-out width threshold.
    pub fn parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Sets the deepest level at which fan-out may happen.
    pub fn max_parallel_depth(mut self, depth: usize) -> Self {
        self.max_parallel_depth = depth;
        self
    }

    /// Sets the depth limit.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Compares two key trees.
///
/// ```rust
/// use hive_inspect::{CancellationToken, HiveComparer, CompareOptions, MemoryKey, ValueData};
///
/// let left = MemoryKey::builder("Root").value("Start", ValueData::Dword(2)).build();
/// let right = MemoryKey::builder("Root").value("Start", ValueData::Dword(4)).build();
///
/// let result = HiveComparer::new(CompareOptions::default())
///     .compare(Some(&left), Some(&right), &CancellationToken::new())
///     .unwrap();
/// assert_eq!(result.modified_values, 1);
/// ```
#[derive(Clone, Default)]
pub struct HiveComparer {
    options: CompareOptions,
    progress: Option<ProgressFn>,
}

impl HiveComparer {
    /// Creates a comparer with the given options.
    pub fn new(options: CompareOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    /// Registers a callback invoked with the path of each key pair compared.
    ///
    /// In parallel mode the callback runs on worker threads and the order of
    /// calls is unspecified.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Returns the options in use.
    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    /// Compares `left` against `right`.
    ///
    /// Either side may be absent; a missing left root makes the whole right
    /// tree Added and vice versa. Returns `Err(Cancelled)` if `token` is
    /// cancelled before the walk completes; no partial result is returned.
    #[instrument(skip_all, fields(parallel = self.options.parallel))]
    pub fn compare<K: HiveKey>(
        &self,
        left: Option<&K>,
        right: Option<&K>,
        token: &CancellationToken,
    ) -> Result<ComparisonResult, Cancelled> {
        let walk = DiffWalk {
            options: &self.options,
            progress: self.progress.as_ref(),
            token,
            counters: DiffCounters::default(),
        };

        let root = walk.compare_keys(left, right, "", 0)?;
        let counters = walk.counters;
        let result = ComparisonResult {
            root,
            left_label: String::new(),
            right_label: String::new(),
            added_keys: counters.added_keys.into_inner(),
            removed_keys: counters.removed_keys.into_inner(),
            modified_keys: counters.modified_keys.into_inner(),
            added_values: counters.added_values.into_inner(),
            removed_values: counters.removed_values.into_inner(),
            modified_values: counters.modified_values.into_inner(),
        };

        info!(
            key_changes = result.total_key_changes(),
            value_changes = result.total_value_changes(),
            "Comparison complete"
        );
        Ok(result)
    }
}

impl fmt::Debug for HiveComparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HiveComparer")
            .field("options", &self.options)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Compares two roots with default options.
pub fn compare<K: HiveKey>(
    left: &K,
    right: &K,
    token: Option<&CancellationToken>,
) -> Result<ComparisonResult, Cancelled> {
    let fallback = CancellationToken::new();
    HiveComparer::default().compare(Some(left), Some(right), token.unwrap_or(&fallback))
}

#[derive(Debug, Default)]
struct DiffCounters {
    added_keys: AtomicU64,
    removed_keys: AtomicU64,
    modified_keys: AtomicU64,
    added_values: AtomicU64,
    removed_values: AtomicU64,
    modified_values: AtomicU64,
}

fn bump(counter: &AtomicU64, amount: u64) {
    if amount > 0 {
        counter.fetch_add(amount, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// State of one comparison run.
struct DiffWalk<'a> {
    options: &'a CompareOptions,
    progress: Option<&'a ProgressFn>,
    token: &'a CancellationToken,
    counters: DiffCounters,
}

impl DiffWalk<'_> {
    fn compare_keys<K: HiveKey>(
        &self,
        left: Option<&K>,
        right: Option<&K>,
        parent_path: &str,
        depth: usize,
    ) -> Result<KeyDiff, Cancelled> {
        self.token.check()?;

        let name = left.or(right).map(|k| k.name().to_string()).unwrap_or_default();
        let path = join_path(parent_path, &name);
        if let Some(progress) = self.progress {
            progress(&path);
        }

        match (left, right) {
            (None, None) => Ok(KeyDiff::new(name, path, DiffType::Unchanged)),
            (None, Some(added)) => {
                self.count_subtree(added, Side::Right, depth)?;
                Ok(KeyDiff::new(name, path, DiffType::Added))
            }
            (Some(removed), None) => {
                self.count_subtree(removed, Side::Left, depth)?;
                Ok(KeyDiff::new(name, path, DiffType::Removed))
            }
            (Some(left), Some(right)) => self.compare_present(left, right, name, path, depth),
        }
    }

    fn compare_present<K: HiveKey>(
        &self,
        left: &K,
        right: &K,
        name: String,
        path: String,
        depth: usize,
    ) -> Result<KeyDiff, Cancelled> {
        let mut diff = KeyDiff::new(name, path, DiffType::Unchanged);

        let values = left.values().and_then(|l| right.values().map(|r| (l, r)));
        match values {
            Ok((left_values, right_values)) => {
                diff.values = self.compare_values(&left_values, &right_values);
                if diff.values.iter().any(|v| v.diff_type != DiffType::Unchanged) {
                    diff.diff_type = DiffType::Modified;
                    bump(&self.counters.modified_keys, 1);
                }
            }
            Err(err) => {
                debug!(path = %diff.path, error = %err, "Skipping unreadable values during comparison");
                diff.unreadable = true;
                return Ok(diff);
            }
        }

        if depth >= self.options.max_depth {
            return Ok(diff);
        }

        let subkeys = left.subkeys().and_then(|l| right.subkeys().map(|r| (l, r)));
        let (left_subkeys, right_subkeys) = match subkeys {
            Ok(lists) => lists,
            Err(err) => {
                debug!(path = %diff.path, error = %err, "Skipping unreadable subkeys during comparison");
                diff.unreadable = true;
                return Ok(diff);
            }
        };

        let pairs = pair_by_name(&left_subkeys, &right_subkeys, |k| k.name());
        let fan_out = self.options.parallel
            && pairs.len() > self.options.parallel_threshold
            && depth < self.options.max_parallel_depth;

        diff.subkeys = if fan_out {
            let mut children = pairs
                .par_iter()
                .map(|(l, r)| self.compare_keys(*l, *r, &diff.path, depth + 1))
                .collect::<Result<Vec<_>, Cancelled>>()?;
            children.sort_by_cached_key(|child| sort_key(&child.name));
            children
        } else {
            pairs
                .iter()
                .map(|(l, r)| self.compare_keys(*l, *r, &diff.path, depth + 1))
                .collect::<Result<Vec<_>, Cancelled>>()?
        };

        Ok(diff)
    }

    fn compare_values(&self, left: &[ValueNode], right: &[ValueNode]) -> Vec<ValueDiff> {
        pair_by_name(left, right, ValueNode::name)
            .into_iter()
            .map(|(l, r)| {
                let diff_type = match (l, r) {
                    (None, _) => {
                        bump(&self.counters.added_values, 1);
                        DiffType::Added
                    }
                    (_, None) => {
                        bump(&self.counters.removed_values, 1);
                        DiffType::Removed
                    }
                    (Some(a), Some(b)) => {
                        if a.value_type() != b.value_type() || a.formatted() != b.formatted() {
                            bump(&self.counters.modified_values, 1);
                            DiffType::Modified
                        } else {
                            DiffType::Unchanged
                        }
                    }
                };

                ValueDiff {
                    name: l.or(r).map(|v| v.name().to_string()).unwrap_or_default(),
                    diff_type,
                    left_value: l.map(ValueNode::formatted),
                    right_value: r.map(ValueNode::formatted),
                    left_type: l.map(ValueNode::value_type),
                    right_type: r.map(ValueNode::value_type),
                }
            })
            .collect()
    }

    /// Counts a one-sided subtree into the added or removed totals.
    fn count_subtree<K: HiveKey>(&self, key: &K, side: Side, depth: usize) -> Result<(), Cancelled> {
        self.token.check()?;

        let (keys, values) = match side {
            Side::Right => (&self.counters.added_keys, &self.counters.added_values),
            Side::Left => (&self.counters.removed_keys, &self.counters.removed_values),
        };
        bump(keys, 1);

        match key.values() {
            Ok(list) => bump(values, list.len() as u64),
            Err(err) => debug!(path = key.path(), error = %err, "Skipping unreadable values while counting"),
        }

        if depth >= self.options.max_depth {
            return Ok(());
        }
        match key.subkeys() {
            Ok(subkeys) => {
                for subkey in &subkeys {
                    self.count_subtree(subkey, side, depth + 1)?;
                }
            }
            Err(err) => debug!(path = key.path(), error = %err, "Skipping unreadable subkeys while counting"),
        }
        Ok(())
    }
}

fn sort_key(name: &str) -> String {
    fold_name(name)
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", parent, name)
    }
}

/// Pairs items from both sides by case-insensitive name, in sorted order.
///
/// The first item with a given name wins on each side.
fn pair_by_name<'t, T, F>(left: &'t [T], right: &'t [T], name: F) -> Vec<(Option<&'t T>, Option<&'t T>)>
where
    F: Fn(&T) -> &str,
{
    let mut union: BTreeMap<String, (Option<&'t T>, Option<&'t T>)> = BTreeMap::new();
    for item in left {
        let entry = union.entry(sort_key(name(item))).or_insert((None, None));
        entry.0.get_or_insert(item);
    }
    for item in right {
        let entry = union.entry(sort_key(name(item))).or_insert((None, None));
        entry.1.get_or_insert(item);
    }
    union.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MemoryKey;
    use crate::value::ValueData;

    fn services(start: &str, extra: bool) -> MemoryKey {
        let mut foo = MemoryKey::builder("Foo").value("Start", ValueData::Text(start.into()));
        if extra {
            foo = foo.subkey(MemoryKey::builder("Bar"));
        }
        MemoryKey::builder("Root")
            .subkey(MemoryKey::builder("Services").subkey(foo))
            .build()
    }

    fn run(left: &MemoryKey, right: &MemoryKey, options: CompareOptions) -> ComparisonResult {
        HiveComparer::new(options)
            .compare(Some(left), Some(right), &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_services_scenario() {
        let result = run(&services("2", false), &services("4", true), CompareOptions::default());

        let foo = result.root.find("Services\\Foo").unwrap();
        assert_eq!(foo.diff_type, DiffType::Modified);
        assert!(foo.has_differences());
        assert_eq!(foo.values.len(), 1);
        assert_eq!(foo.values[0].diff_type, DiffType::Modified);
        assert_eq!(foo.values[0].left_value.as_deref(), Some("2"));
        assert_eq!(foo.values[0].right_value.as_deref(), Some("4"));

        let bar = foo.find("Bar").unwrap();
        assert_eq!(bar.diff_type, DiffType::Added);
        assert_eq!(bar.path, "Root\\Services\\Foo\\Bar");

        assert_eq!(result.modified_values, 1);
        assert_eq!(result.added_keys, 1);
        assert_eq!(result.modified_keys, 1);
        assert_eq!(result.root.diff_type, DiffType::Unchanged);
        assert!(result.root.has_differences());
    }

    #[test]
    fn test_flat_differences_order() {
        let result = run(&services("2", false), &services("4", true), CompareOptions::default());
        let rows = result.flat_differences();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].path, "Root\\Services\\Foo");
        assert_eq!(rows[0].value_name, "Start");
        assert_eq!(rows[1].path, "Root\\Services\\Foo\\Bar");
        assert_eq!(rows[1].value_name, KEY_ROW_NAME);
    }

    #[test]
    fn test_type_change_is_modification() {
        let left = MemoryKey::builder("Root").value("V", ValueData::Text("1".into())).build();
        let right = MemoryKey::builder("Root")
            .value("V", ValueData::ExpandText("1".into()))
            .build();
        assert_eq!(run(&left, &right, CompareOptions::default()).modified_values, 1);
    }

    #[test]
    fn test_value_names_case_insensitive_first_wins() {
        let left = MemoryKey::builder("Root")
            .value("Path", ValueData::Dword(1))
            .value("PATH", ValueData::Dword(9))
            .build();
        let right = MemoryKey::builder("Root").value("path", ValueData::Dword(1)).build();
        let result = run(&left, &right, CompareOptions::default());
        assert!(!result.has_differences());
        assert_eq!(result.root.values.len(), 1);
    }

    #[test]
    fn test_removed_subtree_counts_descendants() {
        let left = MemoryKey::builder("Root")
            .subkey(
                MemoryKey::builder("Gone")
                    .value("A", ValueData::Dword(1))
                    .subkey(MemoryKey::builder("Child").value("B", ValueData::Dword(2))),
            )
            .build();
        let right = MemoryKey::builder("Root").build();
        let result = run(&left, &right, CompareOptions::default());
        assert_eq!(result.removed_keys, 2);
        assert_eq!(result.removed_values, 2);
        assert!(result.root.find("Gone").unwrap().subkeys.is_empty());
    }

    #[test]
    fn test_unreadable_pair_is_marked() {
        let left = MemoryKey::builder("Root")
            .subkey(MemoryKey::builder("Broken").unreadable_subkeys())
            .build();
        let right = MemoryKey::builder("Root").subkey(MemoryKey::builder("Broken")).build();
        let result = run(&left, &right, CompareOptions::default());
        let broken = result.root.find("Broken").unwrap();
        assert!(broken.unreadable);
        assert_eq!(broken.diff_type, DiffType::Unchanged);
    }

    #[test]
    fn test_cancelled_before_start() {
        let tree = services("2", false);
        let token = CancellationToken::new();
        token.cancel();
        let result = HiveComparer::default().compare(Some(&tree), Some(&tree), &token);
        assert_eq!(result, Err(Cancelled));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let wide = |flip: bool| {
            let mut root = MemoryKey::builder("Root");
            for i in 0..40 {
                let data = if flip && i % 3 == 0 { i + 100 } else { i };
                root = root.subkey(
                    MemoryKey::builder(format!("Key{:02}", 39 - i)).value("N", ValueData::Dword(data)),
                );
            }
            root.build()
        };
        let (left, right) = (wide(false), wide(true));
        let sequential = run(&left, &right, CompareOptions::sequential());
        let parallel = run(&left, &right, CompareOptions::default().parallel_threshold(2));
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.root.subkeys[0].name, "Key00");
    }

    #[test]
    fn test_multi_char_uppercase_names_stay_distinct() {
        let left = MemoryKey::builder("Root")
            .subkey(MemoryKey::builder("Straße"))
            .subkey(MemoryKey::builder("STRASSE"))
            .build();
        let right = MemoryKey::builder("Root").subkey(MemoryKey::builder("Straße")).build();

        let result = run(&left, &right, CompareOptions::sequential());
        let children: Vec<(&str, DiffType)> = result
            .root
            .subkeys
            .iter()
            .map(|k| (k.name.as_str(), k.diff_type))
            .collect();
        assert_eq!(
            children,
            vec![("STRASSE", DiffType::Removed), ("Straße", DiffType::Unchanged)]
        );
        assert_eq!(result.removed_keys, 1);
    }

    #[test]
    fn test_find_folds_non_ascii() {
        let left = MemoryKey::builder("Root")
            .subkey(MemoryKey::builder("Ünicode").value("Ä", ValueData::Dword(1)))
            .build();
        let right = MemoryKey::builder("Root")
            .subkey(MemoryKey::builder("ÜNICODE").value("ä", ValueData::Dword(1)))
            .build();

        let result = run(&left, &right, CompareOptions::default());
        let key = result.root.find("ünicode").unwrap();
        assert_eq!(key.values.len(), 1);
        assert!(!result.has_differences());
    }
}
