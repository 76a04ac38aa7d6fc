//! Merging an extracted payload into a live deployment.
//!
//! The merger walks the payload under an exclusion filter and copies what it
//! finds to the same relative path in the destination. Because the same
//! filter decides both sides, excluded destination paths are never touched
//! whether or not the package contains them. Every change is journaled so a
//! partial merge can be undone before the backup is restored over it.

use crate::error::{ArchiveError, Result};
use crate::filter::PathFilter;
use crate::progress::FileProgress;
use crate::walker::{EntryKind, TreeWalker, WarningKind};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// How many directory levels below the extraction root are searched for a
/// marker file.
pub const MAX_PAYLOAD_DEPTH: usize = 2;

/// What to do when a destination file already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Replace the existing file
    #[default]
    Overwrite,
    /// Leave the existing file in place
    KeepExisting,
}

/// Record of destination changes made by a merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeJournal {
    /// Directories created, parents first
    pub created_dirs: Vec<PathBuf>,

    /// Files and symlinks that did not exist before
    pub created_files: Vec<PathBuf>,

    /// Files and symlinks replaced in place
    pub overwritten_files: Vec<PathBuf>,
}

impl MergeJournal {
    pub fn is_empty(&self) -> bool {
        self.created_dirs.is_empty()
            && self.created_files.is_empty()
            && self.overwritten_files.is_empty()
    }

    /// Remove everything the merge created.
    ///
    /// Overwritten files are left as they are; restoring their previous
    /// content is the backup's job. Paths that are already gone are ignored.
    pub fn undo(&self) -> Result<usize> {
        let mut removed = 0;

        for file in self.created_files.iter().rev() {
            match fs::remove_file(file) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ArchiveError::io(file, e)),
            }
        }

        for dir in self.created_dirs.iter().rev() {
            match fs::remove_dir_all(dir) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ArchiveError::io(dir, e)),
            }
        }

        debug!("Undid {} merge changes", removed);
        Ok(removed)
    }
}

/// Outcome of a completed merge
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub files_copied: usize,
    pub dirs_created: usize,
    pub symlinks_created: usize,
    /// Existing files left alone under [`ConflictPolicy::KeepExisting`]
    pub kept_existing: usize,
    pub journal: MergeJournal,
}

/// A merge that stopped partway, with the changes made before it stopped
#[derive(Debug, Error)]
#[error("{error}")]
pub struct MergeFailure {
    #[source]
    pub error: ArchiveError,
    pub journal: MergeJournal,
}

/// Copies a payload tree over a destination tree
#[derive(Debug, Clone)]
pub struct DirectoryMerger {
    filter: PathFilter,
    policy: ConflictPolicy,
    show_progress: bool,
}

impl DirectoryMerger {
    /// Create a merger that never touches paths matched by `filter`
    pub fn new(filter: PathFilter) -> Self {
        Self {
            filter,
            policy: ConflictPolicy::default(),
            show_progress: false,
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Merge `source_root` into `dest_root`.
    ///
    /// The payload is walked completely before anything is written, so an
    /// unreadable payload fails with an empty journal.
    pub fn merge(
        &self,
        source_root: &Path,
        dest_root: &Path,
    ) -> std::result::Result<MergeReport, MergeFailure> {
        let mut report = MergeReport::default();

        let (entries, warnings) = TreeWalker::new(source_root, self.filter.clone())
            .collect()
            .map_err(|error| MergeFailure {
                error,
                journal: MergeJournal::default(),
            })?;

        if let Some(warning) = warnings.iter().find(|w| w.kind == WarningKind::Unreadable) {
            return Err(MergeFailure {
                error: ArchiveError::io(
                    &warning.path,
                    io::Error::other(warning.message.clone()),
                ),
                journal: MergeJournal::default(),
            });
        }

        debug!(
            "Merging {} entries from {} into {}",
            entries.len(),
            source_root.display(),
            dest_root.display()
        );

        // The destination root itself may be a symlinked release directory.
        if !dest_root.is_dir() {
            if let Err(error) = self.ensure_dir(dest_root, &mut report) {
                return Err(MergeFailure {
                    error,
                    journal: report.journal,
                });
            }
        }

        let progress = FileProgress::new(self.show_progress, entries.len() as u64, "Merging");
        for entry in &entries {
            let dest = dest_root.join(&entry.relative_path);
            let step = match &entry.kind {
                EntryKind::Dir => self.ensure_dir(&dest, &mut report),
                EntryKind::File => self.copy_file(&entry.absolute_path, &dest, &mut report),
                EntryKind::Symlink { target } => self.copy_symlink(target, &dest, &mut report),
            };
            if let Err(error) = step {
                warn!("Merge stopped at {}: {}", dest.display(), error);
                return Err(MergeFailure {
                    error,
                    journal: report.journal,
                });
            }
            progress.inc();
        }
        progress.finish("Merge complete");

        info!(
            "Merged {} files into {} ({} directories created)",
            report.files_copied,
            dest_root.display(),
            report.dirs_created
        );
        Ok(report)
    }

    fn ensure_dir(&self, dest: &Path, report: &mut MergeReport) -> Result<()> {
        match fs::symlink_metadata(dest) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ArchiveError::conflict(
                dest,
                "destination exists and is not a directory",
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(dest).map_err(|e| ArchiveError::io(dest, e))?;
                report.journal.created_dirs.push(dest.to_path_buf());
                report.dirs_created += 1;
                Ok(())
            }
            Err(e) => Err(ArchiveError::io(dest, e)),
        }
    }

    fn copy_file(&self, source: &Path, dest: &Path, report: &mut MergeReport) -> Result<()> {
        let existed = match fs::symlink_metadata(dest) {
            Ok(meta) if meta.is_dir() => {
                return Err(ArchiveError::conflict(
                    dest,
                    "destination is a directory but the package has a file",
                ));
            }
            Ok(meta) => {
                if self.policy == ConflictPolicy::KeepExisting {
                    report.kept_existing += 1;
                    return Ok(());
                }
                if meta.file_type().is_symlink() {
                    fs::remove_file(dest).map_err(|e| ArchiveError::io(dest, e))?;
                }
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(ArchiveError::io(dest, e)),
        };

        fs::copy(source, dest).map_err(|e| ArchiveError::io(dest, e))?;
        if existed {
            report.journal.overwritten_files.push(dest.to_path_buf());
        } else {
            report.journal.created_files.push(dest.to_path_buf());
        }
        report.files_copied += 1;
        Ok(())
    }

    #[cfg(unix)]
    fn copy_symlink(&self, target: &Path, dest: &Path, report: &mut MergeReport) -> Result<()> {
        let existed = match fs::symlink_metadata(dest) {
            Ok(meta) if meta.is_dir() => {
                return Err(ArchiveError::conflict(
                    dest,
                    "destination is a directory but the package has a symlink",
                ));
            }
            Ok(_) => {
                if self.policy == ConflictPolicy::KeepExisting {
                    report.kept_existing += 1;
                    return Ok(());
                }
                fs::remove_file(dest).map_err(|e| ArchiveError::io(dest, e))?;
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(ArchiveError::io(dest, e)),
        };

        std::os::unix::fs::symlink(target, dest).map_err(|e| ArchiveError::io(dest, e))?;
        if existed {
            report.journal.overwritten_files.push(dest.to_path_buf());
        } else {
            report.journal.created_files.push(dest.to_path_buf());
        }
        report.symlinks_created += 1;
        Ok(())
    }

    #[cfg(not(unix))]
    fn copy_symlink(&self, _target: &Path, dest: &Path, _report: &mut MergeReport) -> Result<()> {
        warn!(
            "Skipping symlink {}: not supported on this platform",
            dest.display()
        );
        Ok(())
    }
}

/// Find the directory holding the real payload inside an extraction root.
///
/// Packages are sometimes wrapped in one or two extra directories (a
/// release zipball always is). Directories are searched breadth-first in
/// name order, from `root` down to `max_depth` levels below it; the first
/// one containing any of `markers` wins.
pub fn locate_root(root: &Path, markers: &[String], max_depth: usize) -> Result<PathBuf> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {
                candidates.push((entry.depth(), entry.into_path()))
            }
            Ok(_) => {}
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("cannot list payload root"));
                return Err(ArchiveError::io(root, source));
            }
            Err(e) => warn!("Cannot search {}: {}", root.display(), e),
        }
    }

    // Stable sort keeps name order within each level
    candidates.sort_by_key(|(depth, _)| *depth);

    for (depth, dir) in candidates {
        if markers.iter().any(|marker| dir.join(marker).is_file()) {
            debug!("Located payload root {} at depth {}", dir.display(), depth);
            return Ok(dir);
        }
    }

    Err(ArchiveError::PayloadStructure {
        root: root.to_path_buf(),
        markers: markers.join(", "),
        depth: max_depth,
    })
}
