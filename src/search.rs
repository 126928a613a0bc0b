//! Key tree search and statistics.
//!
//! Traversal is depth first: a key's name, then each of its values (name,
//! then data), then its subkeys. Depth is bounded because a damaged hive
//! can contain subkey lists that loop back to an ancestor.
//!
//! A key whose values or subkeys cannot be enumerated is recorded in the
//! report's `skipped` list and traversal continues with its siblings.
//! Matches found on that key before the failure are kept.

use crate::error::Result;
use crate::hive_type::HiveType;
use crate::tree::{HiveKey, ValueNode};
use tracing::debug;

/// Default depth limit for searches.
pub const DEFAULT_MAX_SEARCH_DEPTH: usize = 100;

/// Depth limit for statistics passes.
pub const STATISTICS_MAX_DEPTH: usize = 512;

/// What part of a key matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MatchKind {
    /// The key name.
    Key,
    /// A value name.
    ValueName,
    /// A value's decoded data.
    ValueData,
}

/// One search hit. A key with three matching values yields three hits.
#[derive(Debug, Clone)]
pub struct SearchMatch<K> {
    /// Key the match was found on.
    pub key: K,
    /// Matching value, for value matches.
    pub value: Option<ValueNode>,
    /// What matched.
    pub kind: MatchKind,
}

/// A key that traversal could not fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SkippedKey {
    /// Path of the key.
    pub path: String,
    /// Why enumeration failed.
    pub reason: String,
}

/// Search results plus traversal diagnostics.
#[derive(Debug, Clone)]
pub struct SearchReport<K> {
    /// Matches in traversal order.
    pub matches: Vec<SearchMatch<K>>,
    /// Keys skipped because of read errors.
    pub skipped: Vec<SkippedKey>,
}

/// Search configuration.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Use ordinal comparison instead of case-insensitive comparison.
    pub case_sensitive: bool,
    /// Require the match to be bounded by non-alphanumeric characters.
    pub whole_word: bool,
    /// Deepest level visited; the root is depth 0.
    pub max_depth: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            whole_word: false,
            max_depth: DEFAULT_MAX_SEARCH_DEPTH,
        }
    }
}

impl SearchOptions {
    /// Sets case sensitivity.
    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    /// Sets whole-word matching.
    pub fn whole_word(mut self, enabled: bool) -> Self {
        self.whole_word = enabled;
        self
    }

    /// Sets the depth limit.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// A compiled search over key trees.
///
/// # Matching policy
///
/// The substring test honours `case_sensitive`. The whole-word boundary
/// test is always evaluated case-insensitively: some case-insensitive
/// occurrence of the pattern must be bounded by string edges or
/// non-alphanumeric characters on both sides.
///
/// An empty pattern matches nothing.
#[derive(Debug, Clone)]
pub struct KeySearch {
    pattern: String,
    folded_pattern: String,
    options: SearchOptions,
}

impl KeySearch {
    /// Creates a search for `pattern`.
    pub fn new(pattern: impl Into<String>, options: SearchOptions) -> Self {
        let pattern = pattern.into();
        Self {
            folded_pattern: pattern.to_lowercase(),
            pattern,
            options,
        }
    }

    /// Tests a single string against the pattern.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_inspect::{KeySearch, SearchOptions};
    /// let search = KeySearch::new("foo", SearchOptions::default().whole_word(true));
    /// assert!(search.is_match("foo,bar"));
    /// assert!(!search.is_match("fooBar"));
    /// ```
    pub fn is_match(&self, text: &str) -> bool {
        if self.pattern.is_empty() {
            return false;
        }

        let folded_text = text.to_lowercase();
        let found = if self.options.case_sensitive {
            text.contains(&self.pattern)
        } else {
            folded_text.contains(&self.folded_pattern)
        };

        found && (!self.options.whole_word || has_bounded_occurrence(&folded_text, &self.folded_pattern))
    }

    /// Runs the search and returns the matches.
    pub fn search<K: HiveKey>(&self, root: &K) -> Vec<SearchMatch<K>> {
        self.search_report(root).matches
    }

    /// Runs the search and returns matches plus skipped keys.
    pub fn search_report<K: HiveKey>(&self, root: &K) -> SearchReport<K> {
        let mut report = SearchReport {
            matches: Vec::new(),
            skipped: Vec::new(),
        };
        self.visit(root, 0, &mut report);
        report
    }

    fn visit<K: HiveKey>(&self, key: &K, depth: usize, report: &mut SearchReport<K>) {
        if depth > self.options.max_depth {
            return;
        }
        if let Err(err) = self.visit_key(key, depth, report) {
            debug!(path = key.path(), error = %err, "Skipping unreadable key during search");
            report.skipped.push(SkippedKey {
                path: key.path().to_string(),
                reason: err.to_string(),
            });
        }
    }

    fn visit_key<K: HiveKey>(&self, key: &K, depth: usize, report: &mut SearchReport<K>) -> Result<()> {
        if self.is_match(key.name()) {
            report.matches.push(SearchMatch {
                key: key.clone(),
                value: None,
                kind: MatchKind::Key,
            });
        }

        for value in key.values()? {
            // A name match wins; the same value is not reported twice
            let kind = if self.is_match(value.name()) {
                MatchKind::ValueName
            } else if self.is_match(&value.display_string()) {
                MatchKind::ValueData
            } else {
                continue;
            };
            report.matches.push(SearchMatch {
                key: key.clone(),
                value: Some(value),
                kind,
            });
        }

        for subkey in key.subkeys()? {
            self.visit(&subkey, depth + 1, report);
        }
        Ok(())
    }
}

/// Searches `root` for `pattern` with the default depth limit.
pub fn search<K: HiveKey>(
    root: &K,
    pattern: &str,
    case_sensitive: bool,
    whole_word: bool,
) -> Vec<SearchMatch<K>> {
    let options = SearchOptions::default()
        .case_sensitive(case_sensitive)
        .whole_word(whole_word);
    KeySearch::new(pattern, options).search(root)
}

fn has_bounded_occurrence(text: &str, pattern: &str) -> bool {
    let is_word_char = |c: Option<char>| c.map_or(false, char::is_alphanumeric);

    let mut from = 0;
    while let Some(pos) = text[from..].find(pattern) {
        let start = from + pos;
        let end = start + pattern.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        if !is_word_char(before) && !is_word_char(after) {
            return true;
        }
        // Step one character so overlapping occurrences are also tried
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
        if from > text.len() {
            break;
        }
    }
    false
}

/// Key and value totals of a tree.
#[derive(Debug, Clone, Default)]
pub struct TreeCounts {
    /// Keys visited, including the root.
    pub total_keys: u64,
    /// Values on visited keys.
    pub total_values: u64,
    /// Keys whose lists could not be read.
    pub skipped: Vec<SkippedKey>,
}

/// Counts keys and values in a single depth-first pass.
pub fn count_tree<K: HiveKey>(root: &K) -> TreeCounts {
    let mut counts = TreeCounts::default();
    count_key(root, 0, &mut counts);
    counts
}

fn count_key<K: HiveKey>(key: &K, depth: usize, counts: &mut TreeCounts) {
    if depth > STATISTICS_MAX_DEPTH {
        return;
    }
    counts.total_keys += 1;

    let result = key.values().and_then(|values| {
        counts.total_values += values.len() as u64;
        key.subkeys()
    });

    match result {
        Ok(subkeys) => {
            for subkey in &subkeys {
                count_key(subkey, depth + 1, counts);
            }
        }
        Err(err) => {
            debug!(path = key.path(), error = %err, "Skipping unreadable key during count");
            counts.skipped.push(SkippedKey {
                path: key.path().to_string(),
                reason: err.to_string(),
            });
        }
    }
}

/// Summary of a loaded hive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HiveStatistics {
    /// Number of keys, including the root.
    pub total_keys: u64,
    /// Number of values.
    pub total_values: u64,
    /// Size of the hive file in bytes.
    pub file_size: u64,
    /// Classified hive type.
    pub hive_type: HiveType,
}
