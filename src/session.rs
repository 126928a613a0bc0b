//! Caller-facing hive session.
//!
//! A [`HiveSession`] holds at most one loaded hive and exposes the
//! operations a front end needs: load, key lookup, search, statistics and
//! comparison. Loading is transactional: the current hive is replaced only
//! after the new one has been opened and validated.

use crate::diff::{CancellationToken, CompareOptions, ComparisonResult, HiveComparer};
use crate::error::{RegistryError, Result};
use crate::hive::{Hive, HiveOptions, RegistryKey};
use crate::hive_type::HiveType;
use crate::search::{count_tree, HiveStatistics, KeySearch, SearchMatch, SearchOptions, SearchReport};
use crate::tree::HiveKey;
use crate::utils::names_equal;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, instrument, warn};

/// A front end's view of the currently loaded hive.
#[derive(Debug, Default)]
pub struct HiveSession {
    hive: Option<Arc<Hive>>,
    options: HiveOptions,
}

impl HiveSession {
    /// Creates an empty session with default load options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty session that loads hives with `options`.
    pub fn with_options(options: HiveOptions) -> Self {
        Self { hive: None, options }
    }

    /// Loads a hive file, replacing the current one on success.
    ///
    /// On failure the previously loaded hive, if any, stays loaded.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<&Arc<Hive>> {
        let hive = Hive::open_with(path, &self.options)?;
        Ok(self.replace(hive))
    }

    /// Loads a hive from memory, replacing the current one on success.
    pub fn load_bytes(&mut self, data: Vec<u8>, label: impl Into<String>) -> Result<&Arc<Hive>> {
        let hive = Hive::from_vec(data, label)?;
        Ok(self.replace(hive))
    }

    fn replace(&mut self, hive: Hive) -> &Arc<Hive> {
        if let Some(previous) = &self.hive {
            info!(previous = previous.label(), next = hive.label(), "Replacing loaded hive");
        }
        self.hive.insert(Arc::new(hive))
    }

    /// Unloads the current hive and returns it.
    pub fn close(&mut self) -> Option<Arc<Hive>> {
        self.hive.take()
    }

    /// Returns true if a hive is loaded.
    pub fn is_loaded(&self) -> bool {
        self.hive.is_some()
    }

    /// Returns the loaded hive.
    pub fn hive(&self) -> Result<&Arc<Hive>> {
        self.hive.as_ref().ok_or(RegistryError::NoHiveLoaded)
    }

    /// Returns the root key of the loaded hive.
    pub fn root_key(&self) -> Result<RegistryKey<'_>> {
        self.hive()?.root_key()
    }

    /// Looks up a key by full or root-relative path.
    pub fn get_key(&self, path: &str) -> Result<Option<RegistryKey<'_>>> {
        self.hive()?.get_key(path)
    }

    /// Searches the whole loaded hive.
    pub fn search_all(
        &self,
        pattern: &str,
        case_sensitive: bool,
        whole_word: bool,
    ) -> Result<Vec<SearchMatch<RegistryKey<'_>>>> {
        let options = SearchOptions::default()
            .case_sensitive(case_sensitive)
            .whole_word(whole_word);
        Ok(self.search_with(pattern, options)?.matches)
    }

    /// Searches the whole loaded hive, reporting skipped keys.
    #[instrument(skip(self, options))]
    pub fn search_with(
        &self,
        pattern: &str,
        options: SearchOptions,
    ) -> Result<SearchReport<RegistryKey<'_>>> {
        let root = self.root_key()?;
        let report = KeySearch::new(pattern, options).search_report(&root);
        if !report.skipped.is_empty() {
            warn!(skipped = report.skipped.len(), "Some keys could not be read during search");
        }
        info!(matches = report.matches.len(), "Search complete");
        Ok(report)
    }

    /// Counts keys and values of the loaded hive.
    pub fn statistics(&self) -> Result<HiveStatistics> {
        let hive = self.hive()?;
        let counts = count_tree(&hive.root_key()?);
        if !counts.skipped.is_empty() {
            warn!(skipped = counts.skipped.len(), "Some keys could not be counted");
        }
        Ok(HiveStatistics {
            total_keys: counts.total_keys,
            total_values: counts.total_values,
            file_size: hive.file_size(),
            hive_type: hive.hive_type(),
        })
    }

    /// Rewrites the root component of `path` to the conventional registry
    /// root for the loaded hive's type.
    ///
    /// Returns `path` unchanged when no hive is loaded or the type has no
    /// conventional root.
    pub fn convert_root_path(&self, path: &str) -> String {
        let Ok(hive) = self.hive() else {
            return path.to_string();
        };
        match hive.root_key() {
            Ok(root) => convert_root_path(path, root.name(), hive.hive_type()),
            Err(_) => path.to_string(),
        }
    }

    /// Compares the loaded hive (left) against `other` (right).
    pub fn compare_with(
        &self,
        other: &Hive,
        options: &CompareOptions,
        token: &CancellationToken,
    ) -> Result<ComparisonResult> {
        compare_hives(self.hive()?, other, options, token)
    }
}

/// Replaces a leading `root_name` component with the mount point of
/// `hive_type`.
///
/// ```rust
/// use hive_inspect::{convert_root_path, HiveType};
///
/// let path = convert_root_path("ROOT\\ControlSet001", "ROOT", HiveType::System);
/// assert_eq!(path, "HKLM\\SYSTEM\\ControlSet001");
/// ```
pub fn convert_root_path(path: &str, root_name: &str, hive_type: HiveType) -> String {
    let Some(mount_point) = hive_type.mount_point() else {
        return path.to_string();
    };
    let (first, rest) = match path.split_once('\\') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    };
    if !names_equal(first, root_name) {
        return path.to_string();
    }
    match rest {
        Some(rest) => format!("{}\\{}", mount_point, rest),
        None => mount_point.to_string(),
    }
}

/// Compares two loaded hives, left against right.
///
/// Cancellation surfaces as [`RegistryError::Cancelled`].
#[instrument(skip_all, fields(left = left.label(), right = right.label()))]
pub fn compare_hives(
    left: &Hive,
    right: &Hive,
    options: &CompareOptions,
    token: &CancellationToken,
) -> Result<ComparisonResult> {
    let left_root = left.root_key()?;
    let right_root = right.root_key()?;
    let result = HiveComparer::new(options.clone()).compare(Some(&left_root), Some(&right_root), token)?;
    Ok(result.with_labels(left.label(), right.label()))
}

/// Runs [`compare_hives`] on a background thread.
///
/// Cancel through `token`; the handle then yields
/// `Err(RegistryError::Cancelled)`.
pub fn spawn_compare(
    left: Arc<Hive>,
    right: Arc<Hive>,
    options: CompareOptions,
    token: CancellationToken,
) -> JoinHandle<Result<ComparisonResult>> {
    std::thread::spawn(move || compare_hives(&left, &right, &options, &token))
}
