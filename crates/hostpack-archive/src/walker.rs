//! Pre-order directory walking under exclusion rules.
//!
//! Built on `walkdir`: the walk is lazy, excluded directories are pruned
//! before they are opened, and siblings come out in file name order so
//! consumers see the same sequence on every platform.

use crate::error::{ArchiveError, Result};
use crate::filter::{relative_path, PathFilter};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, FilterEntry, WalkDir};

/// Kind of a walked entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory
    Dir,
    /// Regular file
    File,
    /// Symbolic link pointing inside the walked root (never dereferenced)
    Symlink { target: PathBuf },
}

/// A single walked entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Absolute path on disk
    pub absolute_path: PathBuf,

    /// Forward-slash path relative to the walk root
    pub relative_path: String,

    /// Entry kind
    pub kind: EntryKind,
}

impl WalkEntry {
    /// Whether the entry is a directory
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Why the walk skipped a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Content exists but could not be read; an archive of the tree is incomplete
    Unreadable,
    /// Entry deliberately left out (escaping or dangling symlink, special file)
    Ignored,
}

/// Something the walk skipped instead of failing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    /// Path that was skipped
    pub path: PathBuf,

    /// Category of the skip
    pub kind: WarningKind,

    /// Why it was skipped
    pub message: String,
}

/// Recursive enumerator over a root directory
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    filter: PathFilter,
}

impl TreeWalker {
    /// Create a walker for `root` honoring `filter`
    pub fn new(root: impl Into<PathBuf>, filter: PathFilter) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    /// The walk root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The exclusion filter
    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Start the walk. Fails only if the root itself cannot be listed.
    pub fn walk(&self) -> Result<Walk> {
        let root_unreadable = |source| ArchiveError::RootUnreadable {
            path: self.root.clone(),
            source,
        };
        fs::read_dir(&self.root).map_err(root_unreadable)?;
        let canonical_root = fs::canonicalize(&self.root).map_err(root_unreadable)?;

        debug!("Walking {}", self.root.display());

        let root = self.root.clone();
        let filter = self.filter.clone();
        let keep: KeepEntry = Box::new(move |entry: &DirEntry| {
            match relative_path(&root, entry.path()) {
                Some(relative) => relative.is_empty() || !filter.matches_normalized(&relative),
                // Reported by the walk itself
                None => true,
            }
        });

        let inner = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(keep);

        Ok(Walk {
            root: self.root.clone(),
            canonical_root,
            inner,
            warnings: Vec::new(),
        })
    }

    /// Walk to completion, returning entries and warnings
    pub fn collect(&self) -> Result<(Vec<WalkEntry>, Vec<WalkWarning>)> {
        let mut walk = self.walk()?;
        let entries: Vec<WalkEntry> = walk.by_ref().collect();
        Ok((entries, walk.into_warnings()))
    }
}

type KeepEntry = Box<dyn FnMut(&DirEntry) -> bool + Send>;

/// An in-progress walk; iterate it to get entries in pre-order
pub struct Walk {
    root: PathBuf,
    canonical_root: PathBuf,
    inner: FilterEntry<walkdir::IntoIter, KeepEntry>,
    warnings: Vec<WalkWarning>,
}

impl Walk {
    /// Warnings collected so far
    pub fn warnings(&self) -> &[WalkWarning] {
        &self.warnings
    }

    /// Consume the walk, returning its warnings
    pub fn into_warnings(self) -> Vec<WalkWarning> {
        self.warnings
    }

    fn skip(&mut self, path: &Path, kind: WarningKind, message: String) {
        warn!("Skipping {}: {}", path.display(), message);
        self.warnings.push(WalkWarning {
            path: path.to_path_buf(),
            kind,
            message,
        });
    }

    /// Resolve a symlink, keeping it only if it stays inside the root
    fn inspect_symlink(&mut self, path: &Path) -> Option<PathBuf> {
        let target = match fs::read_link(path) {
            Ok(target) => target,
            Err(e) => {
                self.skip(
                    path,
                    WarningKind::Unreadable,
                    format!("unreadable symlink: {}", e),
                );
                return None;
            }
        };

        match fs::canonicalize(path) {
            Ok(resolved) if resolved.starts_with(&self.canonical_root) => Some(target),
            Ok(resolved) => {
                self.skip(
                    path,
                    WarningKind::Ignored,
                    format!("symlink escapes the root (-> {})", resolved.display()),
                );
                None
            }
            Err(_) => {
                self.skip(
                    path,
                    WarningKind::Ignored,
                    format!("dangling symlink (-> {})", target.display()),
                );
                None
            }
        }
    }
}

impl Iterator for Walk {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(&self.root).to_path_buf();
                    let message = match e.io_error() {
                        Some(io) => format!("unreadable directory: {}", io),
                        None => e.to_string(),
                    };
                    self.skip(&path, WarningKind::Unreadable, message);
                    continue;
                }
            };

            let Some(relative) = relative_path(&self.root, entry.path()) else {
                if entry.file_type().is_dir() {
                    self.inner.skip_current_dir();
                }
                self.skip(
                    entry.path(),
                    WarningKind::Unreadable,
                    "file name is not valid UTF-8".to_string(),
                );
                continue;
            };

            let file_type = entry.file_type();
            let kind = if file_type.is_symlink() {
                match self.inspect_symlink(entry.path()) {
                    Some(target) => EntryKind::Symlink { target },
                    None => continue,
                }
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                self.skip(
                    entry.path(),
                    WarningKind::Ignored,
                    "not a regular file, directory or symlink".to_string(),
                );
                continue;
            };

            return Some(WalkEntry {
                absolute_path: entry.into_path(),
                relative_path: relative,
                kind,
            });
        }
    }
}
