//! Pattern batch orchestration, directory traversal and output registration.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use filetime::FileTime;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::output::{AssetOutputSet, SpecAssetSource, SpecDependencyRecord};
use crate::report::{ReportCopyAssets, ReportCopyAssetsBuilder};
use crate::spec::{
    CopyAssetsError, SpecAssetPattern, SpecCopyAssetsOptions, validate_asset_patterns,
};
use crate::util::{
    SpecIgnorePatterns, calculate_worker_limit, derive_relative_path, derive_walked_destination,
    resolve_destination, should_write,
};

/// Result of one Asset Writer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumAssetWriteOutcome {
    /// Entry inserted or overwritten.
    Written,
    /// Output set left unchanged.
    Skipped,
}

/// State carried from one batch to the next.
#[derive(Debug, Default)]
pub struct SpecBatchState {
    time_last_batch: Option<FileTime>,
    record_deps: Mutex<SpecDependencyRecord>,
}

impl SpecBatchState {
    /// End time of the last successful batch, `None` before the first.
    pub fn time_last_batch(&self) -> Option<FileTime> {
        self.time_last_batch
    }

    /// Snapshot of dependencies accumulated so far.
    pub fn dependencies(&self) -> SpecDependencyRecord {
        self.record_deps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone)]
struct SpecWriteTask {
    path_file_src: PathBuf,
    path_file_dst: PathBuf,
}

/// Nesting limit for one directory walk. Also stops symlink cycles on
/// platforms without device/inode identity.
const N_WALK_DEPTH_MAX: usize = 64;

#[derive(Debug)]
struct SpecWalkContext {
    /// (dev, ino) of the directories on the current descent path only.
    set_ancestor_dirs: HashSet<(u64, u64)>,
    n_depth_max: usize,
    l_files: Vec<PathBuf>,
}

impl SpecWalkContext {
    fn new(n_depth_max: usize) -> Self {
        Self {
            set_ancestor_dirs: HashSet::new(),
            n_depth_max,
            l_files: Vec::new(),
        }
    }
}

/// Asset copy engine.
///
/// Holds the declared patterns, the compiled ignore list and the batch state.
/// Each [`CopyAssets::run_batch`] call walks every pattern in order and
/// registers stale sources in the caller's [`AssetOutputSet`].
#[derive(Debug)]
pub struct CopyAssets {
    path_dir_base: PathBuf,
    l_patterns: Vec<SpecAssetPattern>,
    spec_ignore: SpecIgnorePatterns,
    n_workers_max: usize,
    state_batch: SpecBatchState,
}

impl CopyAssets {
    /// Build an engine rooted at `dir_base`.
    ///
    /// Fails with a config error on an empty `from` or an invalid ignore pattern.
    pub fn new<P>(
        dir_base: P,
        patterns: Vec<SpecAssetPattern>,
        spec_options: SpecCopyAssetsOptions,
    ) -> Result<Self, CopyAssetsError>
    where
        P: AsRef<Path>,
    {
        validate_asset_patterns(&patterns)?;
        let spec_ignore = SpecIgnorePatterns::from_raw(
            spec_options.patterns_ignore.as_deref(),
            spec_options.rule_pattern,
        )?;
        Ok(Self {
            path_dir_base: dir_base.as_ref().to_path_buf(),
            l_patterns: patterns,
            spec_ignore,
            n_workers_max: calculate_worker_limit(spec_options.num_workers_max),
            state_batch: SpecBatchState::default(),
        })
    }

    /// Declared patterns, in order.
    pub fn patterns(&self) -> &[SpecAssetPattern] {
        &self.l_patterns
    }

    /// Batch state (staleness baseline and accumulated dependencies).
    pub fn state(&self) -> &SpecBatchState {
        &self.state_batch
    }

    /// Run one batch over all patterns.
    ///
    /// Patterns are processed sequentially in declared order. The first IO
    /// failure aborts the batch; entries registered before it stay in
    /// `output`. The staleness baseline advances only on success. The
    /// accumulated dependencies are merged into `tracked` either way.
    pub fn run_batch(
        &mut self,
        output: &AssetOutputSet,
        tracked: &mut SpecDependencyRecord,
    ) -> Result<ReportCopyAssets, CopyAssetsError> {
        info!(
            n_patterns = self.l_patterns.len(),
            base = %self.path_dir_base.display(),
            "asset batch started"
        );
        let mut builder_report = ReportCopyAssetsBuilder::default();
        let res_batch = self.write_patterns_to_assets(output, &mut builder_report);

        match &res_batch {
            Ok(()) => {
                self.state_batch.time_last_batch = Some(FileTime::now());
            }
            Err(e) => {
                error!(error = %e, "asset batch aborted");
            }
        }
        self.merge_dependencies(tracked);

        res_batch?;
        let report = builder_report.build();
        info!(
            cnt_scanned = report.cnt_scanned,
            cnt_ignored = report.cnt_ignored,
            cnt_written = report.cnt_written,
            cnt_skipped = report.cnt_skipped,
            "asset batch finished"
        );
        Ok(report)
    }

    /// Union the accumulated dependencies into `tracked`.
    pub fn merge_dependencies(&self, tracked: &mut SpecDependencyRecord) {
        self.state_batch
            .record_deps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge_into(tracked);
    }

    fn write_patterns_to_assets(
        &self,
        output: &AssetOutputSet,
        builder_report: &mut ReportCopyAssetsBuilder,
    ) -> Result<(), CopyAssetsError> {
        for spec_pattern in &self.l_patterns {
            let path_src_abs = self.path_dir_base.join(&spec_pattern.from);
            let meta_src = fs::metadata(&path_src_abs).map_err(|source| CopyAssetsError::Stat {
                path: path_src_abs.clone(),
                source,
            })?;

            if meta_src.is_dir() {
                self.write_directory_to_assets(
                    &path_src_abs,
                    &spec_pattern.to,
                    spec_pattern.force,
                    output,
                    builder_report,
                )?;
                continue;
            }

            builder_report.add_scanned();
            if self.spec_ignore.is_ignored(&spec_pattern.from) {
                debug!(from = %spec_pattern.from, "asset pattern ignored");
                builder_report.add_ignored();
                continue;
            }

            let path_file_dst = resolve_destination(
                Path::new(&spec_pattern.from),
                &spec_pattern.to,
                spec_pattern.to_type,
            );
            match self.write_file_to_assets(
                &path_src_abs,
                path_file_dst,
                spec_pattern.force,
                output,
            )? {
                EnumAssetWriteOutcome::Written => builder_report.add_written(),
                EnumAssetWriteOutcome::Skipped => builder_report.add_skipped(),
            }
        }
        Ok(())
    }

    /// Register `path_file_src` under `path_file_dst` if it is due.
    ///
    /// The source is recorded as a file dependency whether or not it is
    /// written. An existing, unforced destination is skipped without touching
    /// the filesystem.
    pub fn write_file_to_assets(
        &self,
        path_file_src: &Path,
        path_file_dst: PathBuf,
        if_force: bool,
        output: &AssetOutputSet,
    ) -> Result<EnumAssetWriteOutcome, CopyAssetsError> {
        self.state_batch
            .record_deps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_file(path_file_src.to_path_buf());

        if !if_force && output.contains(&path_file_dst) {
            debug!(dst = %path_file_dst.display(), "asset already present; skipping");
            return Ok(EnumAssetWriteOutcome::Skipped);
        }

        let meta_file_src =
            fs::metadata(path_file_src).map_err(|source| CopyAssetsError::Stat {
                path: path_file_src.to_path_buf(),
                source,
            })?;
        let time_mtime = FileTime::from_last_modification_time(&meta_file_src);
        let time_last_batch = self.state_batch.time_last_batch;

        let b_written = output.insert_with(path_file_dst.clone(), |if_exists| {
            should_write(if_exists, if_force, time_mtime, time_last_batch).then(|| {
                SpecAssetSource::new(path_file_src.to_path_buf(), meta_file_src.len())
            })
        });

        if b_written {
            debug!(
                src = %path_file_src.display(),
                dst = %path_file_dst.display(),
                "asset written"
            );
            Ok(EnumAssetWriteOutcome::Written)
        } else {
            debug!(src = %path_file_src.display(), "asset not stale; skipping");
            Ok(EnumAssetWriteOutcome::Skipped)
        }
    }

    /// Register every non-ignored file under `path_dir_src`.
    ///
    /// Destinations are the file's relative path under `dest_prefix`. The
    /// directory is recorded once as a directory dependency; ignored files are
    /// not recorded at all. Every file of the walk is processed before this
    /// returns, and the first error in walk order is reported.
    pub fn write_directory_to_assets(
        &self,
        path_dir_src: &Path,
        dest_prefix: &str,
        if_force: bool,
        output: &AssetOutputSet,
        builder_report: &mut ReportCopyAssetsBuilder,
    ) -> Result<(), CopyAssetsError> {
        self.state_batch
            .record_deps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_dir(path_dir_src.to_path_buf());

        let mut spec_walk_ctx = SpecWalkContext::new(N_WALK_DEPTH_MAX);
        walk_directory(path_dir_src, 0, &mut spec_walk_ctx, builder_report)?;

        let mut l_tasks_write = Vec::with_capacity(spec_walk_ctx.l_files.len());
        for path_file_src in spec_walk_ctx.l_files {
            builder_report.add_scanned();
            let path_relative = derive_relative_path(&path_file_src, path_dir_src);
            if self.spec_ignore.is_ignored(&path_relative) {
                debug!(path = %path_relative, "asset ignored");
                builder_report.add_ignored();
                continue;
            }
            l_tasks_write.push(SpecWriteTask {
                path_file_dst: derive_walked_destination(dest_prefix, Path::new(&path_relative)),
                path_file_src,
            });
        }

        self.flush_write_tasks(l_tasks_write, if_force, output, builder_report)
    }

    fn flush_write_tasks(
        &self,
        l_tasks_write: Vec<SpecWriteTask>,
        if_force: bool,
        output: &AssetOutputSet,
        builder_report: &mut ReportCopyAssetsBuilder,
    ) -> Result<(), CopyAssetsError> {
        if l_tasks_write.is_empty() {
            return Ok(());
        }

        let run_task = |spec_task: SpecWriteTask| {
            self.write_file_to_assets(
                &spec_task.path_file_src,
                spec_task.path_file_dst,
                if_force,
                output,
            )
        };

        let l_results = if self.n_workers_max <= 1 || l_tasks_write.len() == 1 {
            l_tasks_write.into_iter().map(run_task).collect::<Vec<_>>()
        } else {
            match ThreadPoolBuilder::new()
                .num_threads(self.n_workers_max)
                .build()
            {
                Ok(thread_pool) => thread_pool.install(|| {
                    l_tasks_write
                        .into_par_iter()
                        .map(run_task)
                        .collect::<Vec<_>>()
                }),
                Err(e) => {
                    warn!(error = %e, workers = self.n_workers_max, "thread pool unavailable");
                    builder_report.add_warning(format!(
                        "Failed to initialize thread pool (workers={}); fallback to serial walk.",
                        self.n_workers_max
                    ));
                    l_tasks_write.into_iter().map(run_task).collect::<Vec<_>>()
                }
            }
        };

        let mut err_first = None;
        for res_write in l_results {
            match res_write {
                Ok(EnumAssetWriteOutcome::Written) => builder_report.add_written(),
                Ok(EnumAssetWriteOutcome::Skipped) => builder_report.add_skipped(),
                Err(e) => {
                    if err_first.is_none() {
                        err_first = Some(e);
                    }
                }
            }
        }
        match err_first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Collect the files under `path_root` into `spec_walk_ctx`.
///
/// A directory is a loop only when it is one of its own ancestors. Reaching
/// the same directory through two sibling links walks it twice.
fn walk_directory(
    path_root: &Path,
    n_depth: usize,
    spec_walk_ctx: &mut SpecWalkContext,
    builder_report: &mut ReportCopyAssetsBuilder,
) -> Result<(), CopyAssetsError> {
    if n_depth > spec_walk_ctx.n_depth_max {
        warn!(path = %path_root.display(), depth = n_depth, "walk depth limit reached");
        builder_report.add_warning(format!(
            "Walk depth limit reached (max={}): {}",
            spec_walk_ctx.n_depth_max,
            path_root.display()
        ));
        return Ok(());
    }

    #[cfg(unix)]
    let key_dir = {
        use std::os::unix::fs::MetadataExt;

        let stat_root = fs::metadata(path_root).map_err(|source| CopyAssetsError::Stat {
            path: path_root.to_path_buf(),
            source,
        })?;
        let key_dir = (stat_root.dev(), stat_root.ino());
        if !spec_walk_ctx.set_ancestor_dirs.insert(key_dir) {
            warn!(path = %path_root.display(), "symlink loop detected");
            builder_report.add_warning(format!("Symlink loop detected: {}", path_root.display()));
            return Ok(());
        }
        key_dir
    };

    let res_walk = walk_directory_entries(path_root, n_depth, spec_walk_ctx, builder_report);

    #[cfg(unix)]
    spec_walk_ctx.set_ancestor_dirs.remove(&key_dir);

    res_walk
}

fn walk_directory_entries(
    path_root: &Path,
    n_depth: usize,
    spec_walk_ctx: &mut SpecWalkContext,
    builder_report: &mut ReportCopyAssetsBuilder,
) -> Result<(), CopyAssetsError> {
    let iter_entries = fs::read_dir(path_root).map_err(|source| CopyAssetsError::ReadDir {
        path: path_root.to_path_buf(),
        source,
    })?;

    let mut l_dirs: Vec<PathBuf> = Vec::new();
    let mut l_files: Vec<PathBuf> = Vec::new();
    for _entry_res in iter_entries {
        let entry = _entry_res.map_err(|source| CopyAssetsError::ReadDir {
            path: path_root.to_path_buf(),
            source,
        })?;
        let path_entry = entry.path();
        let cfg_file_type = entry.file_type().map_err(|source| CopyAssetsError::Stat {
            path: path_entry.clone(),
            source,
        })?;

        let (b_is_dir, b_is_file) = if cfg_file_type.is_symlink() {
            let meta_target = fs::metadata(&path_entry).map_err(|source| {
                CopyAssetsError::Stat {
                    path: path_entry.clone(),
                    source,
                }
            })?;
            (meta_target.is_dir(), meta_target.is_file())
        } else {
            (cfg_file_type.is_dir(), cfg_file_type.is_file())
        };

        if b_is_dir {
            l_dirs.push(path_entry);
        } else if b_is_file {
            l_files.push(path_entry);
        } else {
            warn!(path = %path_entry.display(), "special file skipped");
            builder_report.add_warning(format!("Special file skipped: {}", path_entry.display()));
        }
    }

    l_dirs.sort();
    l_files.sort();
    spec_walk_ctx.l_files.extend(l_files);

    for path_dir_sub in l_dirs {
        walk_directory(&path_dir_sub, n_depth + 1, spec_walk_ctx, builder_report)?;
    }
    Ok(())
}
