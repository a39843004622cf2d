//! In-memory output set and dependency tracking shared with the build.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

////////////////////////////////////////////////////////////////////////////////
// #region OutputSet

/// Lazy byte source for one output entry.
///
/// Only the source path and the size seen at stat time are stored. Bytes are
/// read from disk on every [`SpecAssetSource::source`] call, so the content is
/// whatever the file holds at flush time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAssetSource {
    path_src: PathBuf,
    n_size: u64,
}

impl SpecAssetSource {
    /// Descriptor for `path_src` with the size observed during resolution.
    pub fn new(path_src: PathBuf, n_size: u64) -> Self {
        Self { path_src, n_size }
    }

    /// Absolute source path.
    pub fn path(&self) -> &Path {
        &self.path_src
    }

    /// Size in bytes at resolution time.
    pub fn size(&self) -> u64 {
        self.n_size
    }

    /// Read the source bytes.
    pub fn source(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path_src)
    }
}

/// Destination-keyed output set consumed by the build's flush step.
///
/// Safe to share across the worker threads of one directory walk.
#[derive(Debug, Default)]
pub struct AssetOutputSet {
    dict_entries: Mutex<BTreeMap<PathBuf, SpecAssetSource>>,
}

impl AssetOutputSet {
    /// Empty output set.
    pub fn new() -> Self {
        Self::default()
    }

    fn _lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, SpecAssetSource>> {
        self.dict_entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `path_dst` already has an entry.
    pub fn contains(&self, path_dst: &Path) -> bool {
        self._lock().contains_key(path_dst)
    }

    /// Clone of the entry at `path_dst`.
    pub fn get(&self, path_dst: &Path) -> Option<SpecAssetSource> {
        self._lock().get(path_dst).cloned()
    }

    /// Insert or overwrite an entry, returning the previous one.
    pub fn insert(
        &self,
        path_dst: PathBuf,
        spec_source: SpecAssetSource,
    ) -> Option<SpecAssetSource> {
        self._lock().insert(path_dst, spec_source)
    }

    /// Remove the entry at `path_dst`.
    pub fn remove(&self, path_dst: &Path) -> Option<SpecAssetSource> {
        self._lock().remove(path_dst)
    }

    /// Check-and-insert under one lock.
    ///
    /// `decide` receives whether `path_dst` is already present and returns the
    /// entry to store, or `None` to leave the set unchanged.
    pub(crate) fn insert_with<F>(&self, path_dst: PathBuf, decide: F) -> bool
    where
        F: FnOnce(bool) -> Option<SpecAssetSource>,
    {
        let mut dict_entries = self._lock();
        let b_if_exists = dict_entries.contains_key(&path_dst);
        match decide(b_if_exists) {
            Some(spec_source) => {
                dict_entries.insert(path_dst, spec_source);
                true
            }
            None => false,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self._lock().len()
    }

    /// Whether the set has no entries.
    pub fn is_empty(&self) -> bool {
        self._lock().is_empty()
    }

    /// Sorted destination paths.
    pub fn destinations(&self) -> Vec<PathBuf> {
        self._lock().keys().cloned().collect()
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> BTreeMap<PathBuf, SpecAssetSource> {
        self._lock().clone()
    }

    /// Consume the set, returning its entries.
    pub fn into_entries(self) -> BTreeMap<PathBuf, SpecAssetSource> {
        self.dict_entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Dependencies

/// Files read and directories scanned, with set semantics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpecDependencyRecord {
    set_files: BTreeSet<PathBuf>,
    set_dirs: BTreeSet<PathBuf>,
}

impl SpecDependencyRecord {
    /// Record a file dependency. Returns `false` if already present.
    pub fn add_file(&mut self, path_file: PathBuf) -> bool {
        self.set_files.insert(path_file)
    }

    /// Record a directory dependency. Returns `false` if already present.
    pub fn add_dir(&mut self, path_dir: PathBuf) -> bool {
        self.set_dirs.insert(path_dir)
    }

    /// Tracked files.
    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.set_files
    }

    /// Tracked directories.
    pub fn dirs(&self) -> &BTreeSet<PathBuf> {
        &self.set_dirs
    }

    /// Whether `path_file` is tracked as a file dependency.
    pub fn contains_file(&self, path_file: &Path) -> bool {
        self.set_files.contains(path_file)
    }

    /// Whether `path_dir` is tracked as a directory dependency.
    pub fn contains_dir(&self, path_dir: &Path) -> bool {
        self.set_dirs.contains(path_dir)
    }

    /// Union this record into `tracked`.
    pub fn merge_into(&self, tracked: &mut SpecDependencyRecord) {
        tracked.set_files.extend(self.set_files.iter().cloned());
        tracked.set_dirs.extend(self.set_dirs.iter().cloned());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
