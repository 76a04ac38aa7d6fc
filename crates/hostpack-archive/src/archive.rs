//! Archive creation from one or more walked trees.
//!
//! Each [`ArchiveSource`] is walked under its own filter and remapped below
//! a top-level label. The combined entry list is sorted before writing so
//! the archive layout does not depend on filesystem iteration order. The
//! archive is written to a temporary sibling and renamed into place only
//! once complete.

use crate::checksum::calculate_checksum;
use crate::error::{ArchiveError, Result};
use crate::filter::PathFilter;
use crate::permissions::{DIR_MODE, FILE_MODE};
use crate::progress::FileProgress;
use crate::walker::{EntryKind, TreeWalker, WarningKind};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// Default gzip compression level for tar.gz archives
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Container format, chosen from the archive file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Zip with deflate compression (packages)
    Zip,
    /// Gzip-compressed tar (backups)
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else {
            Err(ArchiveError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    }

    /// Canonical file extension, including the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::TarGz => ".tar.gz",
        }
    }
}

/// One tree to include in an archive
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    /// Directory to walk
    pub root: PathBuf,

    /// Top-level directory name inside the archive (empty for the archive root)
    pub label: String,

    /// Exclusions applied while walking `root`
    pub filter: PathFilter,
}

impl ArchiveSource {
    pub fn new(root: impl Into<PathBuf>, label: impl Into<String>, filter: PathFilter) -> Self {
        Self {
            root: root.into(),
            label: label.into(),
            filter,
        }
    }
}

/// A single entry scheduled for writing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Forward-slash path inside the archive, never with `..` or a leading `/`
    pub relative_path: String,

    /// Absolute source path on disk
    pub source: PathBuf,

    /// Entry kind
    pub kind: EntryKind,
}

/// A path that could not be archived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of a written archive
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    /// Final archive path
    pub path: PathBuf,

    /// Container format
    pub format: ArchiveFormat,

    /// Entries written (directories, files and symlinks)
    pub entry_count: usize,

    /// Regular files written
    pub file_count: usize,

    /// Archive size in bytes
    pub size_bytes: u64,

    /// SHA-256 of the archive
    pub checksum: String,

    /// Content that exists but could not be read
    pub skipped: Vec<SkippedEntry>,
}

impl ArchiveReport {
    /// Whether every walked entry made it into the archive
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Builds zip or tar.gz archives from labelled sources
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    compression_level: u32,
    show_progress: bool,
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            show_progress: false,
        }
    }

    /// Sets the compression level (clamped to 1-9).
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.clamp(1, 9);
        self
    }

    /// Sets whether to draw a progress bar.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// Walk every source and return the sorted entry list plus anything
    /// that could not be read.
    pub fn plan(
        &self,
        sources: &[ArchiveSource],
    ) -> Result<(Vec<ArchiveEntry>, Vec<SkippedEntry>)> {
        let mut labels = HashSet::new();
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for source in sources {
            validate_label(&source.label)?;
            if !labels.insert(source.label.as_str()) {
                return Err(ArchiveError::invalid_label(
                    &source.label,
                    "used by more than one source",
                ));
            }

            let mut walk = TreeWalker::new(&source.root, source.filter.clone()).walk()?;

            if !source.label.is_empty() {
                entries.push(ArchiveEntry {
                    relative_path: source.label.clone(),
                    source: source.root.clone(),
                    kind: EntryKind::Dir,
                });
            }

            for entry in walk.by_ref() {
                let relative_path = if source.label.is_empty() {
                    entry.relative_path
                } else {
                    format!("{}/{}", source.label, entry.relative_path)
                };
                entries.push(ArchiveEntry {
                    relative_path,
                    source: entry.absolute_path,
                    kind: entry.kind,
                });
            }

            skipped.extend(
                walk.into_warnings()
                    .into_iter()
                    .filter(|w| w.kind == WarningKind::Unreadable)
                    .map(|w| SkippedEntry {
                        path: w.path,
                        reason: w.message,
                    }),
            );
        }

        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        if let Some(pair) = entries
            .windows(2)
            .find(|pair| pair[0].relative_path == pair[1].relative_path)
        {
            return Err(ArchiveError::DuplicateEntry {
                path: pair[0].relative_path.clone(),
            });
        }

        Ok((entries, skipped))
    }

    /// Build an archive at `dest` from `sources`.
    ///
    /// On any error the destination is left untouched.
    pub fn build(&self, dest: &Path, sources: &[ArchiveSource]) -> Result<ArchiveReport> {
        let format = ArchiveFormat::from_path(dest)?;
        let (entries, mut skipped) = self.plan(sources)?;

        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".hostpack-")
            .suffix(".partial")
            .tempfile_in(parent)
            .map_err(|e| ArchiveError::io(parent, e))?;

        debug!(
            "Writing {} entries to {} ({:?})",
            entries.len(),
            dest.display(),
            format
        );

        let progress = FileProgress::new(self.show_progress, entries.len() as u64, "Archiving");
        let counts = match format {
            ArchiveFormat::Zip => write_zip(
                temp.as_file_mut(),
                &entries,
                self.compression_level,
                &mut skipped,
                &progress,
            ),
            ArchiveFormat::TarGz => write_tar_gz(
                temp.as_file_mut(),
                &entries,
                self.compression_level,
                &mut skipped,
                &progress,
            ),
        }
        .map_err(|e| ArchiveError::write(dest, e))?;

        temp.as_file()
            .sync_all()
            .map_err(|e| ArchiveError::write(dest, e))?;
        temp.persist(dest)
            .map_err(|e| ArchiveError::io(dest, e.error))?;

        progress.finish(&format!("Archived {} entries", counts.entries));

        let size_bytes = fs::metadata(dest)
            .map_err(|e| ArchiveError::io(dest, e))?
            .len();
        let checksum = calculate_checksum(dest).map_err(|e| ArchiveError::io(dest, e))?;

        info!(
            "Created {} ({} entries, {} bytes)",
            dest.display(),
            counts.entries,
            size_bytes
        );

        Ok(ArchiveReport {
            path: dest.to_path_buf(),
            format,
            entry_count: counts.entries,
            file_count: counts.files,
            size_bytes,
            checksum,
            skipped,
        })
    }
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Ok(());
    }
    if label.contains('/') || label.contains('\\') {
        return Err(ArchiveError::invalid_label(
            label,
            "must be a single path segment",
        ));
    }
    if label == "." || label == ".." {
        return Err(ArchiveError::invalid_label(label, "must name a directory"));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct WriteCounts {
    entries: usize,
    files: usize,
}

/// Open a source file, recording it as skipped when it cannot be read
fn open_source(entry: &ArchiveEntry, skipped: &mut Vec<SkippedEntry>) -> Option<File> {
    match File::open(&entry.source) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("Skipping {}: {}", entry.source.display(), e);
            skipped.push(SkippedEntry {
                path: entry.source.clone(),
                reason: e.to_string(),
            });
            None
        }
    }
}

fn write_zip(
    file: &mut File,
    entries: &[ArchiveEntry],
    level: u32,
    skipped: &mut Vec<SkippedEntry>,
    progress: &FileProgress,
) -> io::Result<WriteCounts> {
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(i64::from(level)));
    let mut counts = WriteCounts::default();

    for entry in entries {
        progress.inc();
        match &entry.kind {
            EntryKind::Dir => zip
                .add_directory(entry.relative_path.as_str(), options.unix_permissions(DIR_MODE))
                .map_err(io::Error::other)?,
            EntryKind::File => {
                let Some(mut source) = open_source(entry, skipped) else {
                    continue;
                };
                zip.start_file(entry.relative_path.as_str(), options.unix_permissions(FILE_MODE))
                    .map_err(io::Error::other)?;
                io::copy(&mut source, &mut zip)?;
                counts.files += 1;
            }
            EntryKind::Symlink { target } => zip
                .add_symlink(
                    entry.relative_path.as_str(),
                    target.to_string_lossy(),
                    options,
                )
                .map_err(io::Error::other)?,
        }
        counts.entries += 1;
    }

    zip.finish().map_err(io::Error::other)?;
    Ok(counts)
}

fn write_tar_gz(
    file: &mut File,
    entries: &[ArchiveEntry],
    level: u32,
    skipped: &mut Vec<SkippedEntry>,
    progress: &FileProgress,
) -> io::Result<WriteCounts> {
    let encoder = GzEncoder::new(file, Compression::new(level));
    let mut tar = tar::Builder::new(encoder);
    tar.follow_symlinks(false);
    let mut counts = WriteCounts::default();

    for entry in entries {
        progress.inc();
        match &entry.kind {
            EntryKind::Dir => tar.append_dir(&entry.relative_path, &entry.source)?,
            EntryKind::File => {
                let Some(mut source) = open_source(entry, skipped) else {
                    continue;
                };
                tar.append_file(&entry.relative_path, &mut source)?;
                counts.files += 1;
            }
            EntryKind::Symlink { target } => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                tar.append_link(&mut header, &entry.relative_path, target)?;
            }
        }
        counts.entries += 1;
    }

    let mut encoder = tar.into_inner()?;
    encoder.flush()?;
    encoder.finish()?;
    Ok(counts)
}
