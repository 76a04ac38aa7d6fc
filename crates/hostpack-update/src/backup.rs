//! Backup creation, verification, listing and restore
//!
//! Backups are write-once tar.gz archives with one top-level directory per
//! deployment root (`app/`, and `public/` for split layouts). They are
//! ordered by file modification time.

use crate::context::DeploymentRoot;
use crate::error::{Result, UpdateError};
use crate::retention::{BackupRetention, RetentionReport};
use chrono::{DateTime, Utc};
use hostpack_archive::{
    apply_permission_map, extract_archive, list_entries, ArchiveSource, ArchiveWriter,
    ConflictPolicy, DirectoryMerger, DEFAULT_COMPRESSION_LEVEL,
};
use semver::Version;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name prefix of backup archives
pub const BACKUP_PREFIX: &str = "backup-";

/// File name suffix of backup archives
pub const BACKUP_SUFFIX: &str = ".tar.gz";

/// A backup on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl BackupRecord {
    /// Read a record from an existing backup file
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            created_at: DateTime::<Utc>::from(metadata.modified()?),
            size_bytes: metadata.len(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Summary of a restore
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub files_restored: usize,
    pub roots_restored: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Manages the backup directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    compression_level: u32,
    show_progress: bool,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            show_progress: false,
        }
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive the deployment roots into a new, verified backup.
    ///
    /// Anything short of a complete, readable, non-empty archive is a
    /// [`UpdateError::Backup`] and the partial backup is deleted.
    pub fn create(&self, roots: &[DeploymentRoot], version: &Version) -> Result<BackupRecord> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            UpdateError::backup(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let path = self.next_backup_path(version);
        info!("Creating backup {}", path.display());

        let sources: Vec<ArchiveSource> = roots
            .iter()
            .filter(|root| root.path.is_dir() || root.label == crate::context::CODE_LABEL)
            .map(|root| ArchiveSource::new(&root.path, &root.label, root.filter.clone()))
            .collect();

        let report = ArchiveWriter::new()
            .with_compression_level(self.compression_level)
            .with_progress(self.show_progress)
            .build(&path, &sources)
            .map_err(UpdateError::backup)?;

        if !report.is_complete() {
            let first = &report.skipped[0];
            self.discard(&path);
            return Err(UpdateError::backup(format!(
                "{} path(s) could not be read, first: {} ({})",
                report.skipped.len(),
                first.path.display(),
                first.reason
            )));
        }

        let labels: Vec<&str> = sources.iter().map(|s| s.label.as_str()).collect();
        match list_entries(&path) {
            Ok(names) if names.iter().any(|n| !labels.contains(&n.as_str())) => {}
            Ok(_) => {
                self.discard(&path);
                return Err(UpdateError::backup("backup archive is empty"));
            }
            Err(e) => {
                self.discard(&path);
                return Err(UpdateError::backup(format!("backup failed verification: {}", e)));
            }
        }

        let record = BackupRecord::from_path(&path).map_err(UpdateError::backup)?;
        info!(
            "Backup verified: {} ({} entries, {} bytes)",
            record.file_name(),
            report.entry_count,
            record.size_bytes
        );
        Ok(record)
    }

    /// Backups in the directory, newest first
    pub fn list(&self) -> Result<Vec<BackupRecord>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(UpdateError::backup(format!(
                    "cannot read {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut backups: Vec<BackupRecord> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_backup_name(path))
            .filter_map(|path| BackupRecord::from_path(&path).ok())
            .collect();

        sort_newest_first(&mut backups);
        Ok(backups)
    }

    /// The most recent backup, if any
    pub fn latest(&self) -> Result<Option<BackupRecord>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Apply retention, never deleting `protected` backups
    pub fn prune(&self, keep: usize, protected: &[PathBuf]) -> Result<RetentionReport> {
        let backups = self.list()?;
        Ok(BackupRetention::new(keep).apply(&backups, protected))
    }

    /// Restore `record` over the deployment roots.
    ///
    /// The backup is extracted into a staging directory under `work_dir`,
    /// then each label is merged over its root, overwriting, with that
    /// root's filter so excluded paths stay untouched. Permissions are
    /// reapplied afterwards.
    pub fn restore(
        &self,
        record: &BackupRecord,
        roots: &[DeploymentRoot],
        work_dir: &Path,
    ) -> Result<RestoreReport> {
        info!("Restoring backup {}", record.path.display());

        fs::create_dir_all(work_dir).map_err(|e| {
            UpdateError::restore(format!("cannot create {}: {}", work_dir.display(), e))
        })?;
        let staging = tempfile::Builder::new()
            .prefix("restore-")
            .tempdir_in(work_dir)
            .map_err(|e| UpdateError::restore(format!("cannot create staging dir: {}", e)))?;

        extract_archive(&record.path, staging.path()).map_err(UpdateError::restore)?;

        let mut report = RestoreReport::default();
        for root in roots {
            let source = staging.path().join(&root.label);
            if !source.is_dir() {
                debug!("Backup has no '{}' directory, skipping", root.label);
                continue;
            }

            let merged = DirectoryMerger::new(root.filter.clone())
                .with_policy(ConflictPolicy::Overwrite)
                .with_progress(self.show_progress)
                .merge(&source, &root.path)
                .map_err(|failure| UpdateError::restore(failure.error))?;
            report.files_restored += merged.files_copied;

            let (_, warnings) =
                apply_permission_map(&root.path, &root.filter).map_err(UpdateError::restore)?;
            report
                .warnings
                .extend(warnings.into_iter().map(|w| format!("{}: {}", w.path.display(), w.message)));
            report.roots_restored.push(root.path.clone());
        }

        if let Err(e) = staging.close() {
            warn!("Failed to remove restore staging directory: {}", e);
        }

        info!(
            "Restored {} files from {}",
            report.files_restored,
            record.file_name()
        );
        Ok(report)
    }

    fn next_backup_path(&self, version: &Version) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let base = format!("{}{}-v{}", BACKUP_PREFIX, stamp, version);
        let mut path = self.dir.join(format!("{}{}", base, BACKUP_SUFFIX));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}-{}{}", base, n, BACKUP_SUFFIX));
            n += 1;
        }
        path
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to delete unusable backup {}: {}", path.display(), e);
        }
    }
}

fn is_backup_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX))
}

/// Sort by modification time, newest first; names break ties
pub(crate) fn sort_newest_first(backups: &mut [BackupRecord]) {
    backups.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.path.cmp(&a.path))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostpack_archive::PathFilter;
    use tempfile::TempDir;

    fn code_root(path: &Path, filter: PathFilter) -> Vec<DeploymentRoot> {
        vec![DeploymentRoot {
            label: "app".to_string(),
            path: path.to_path_buf(),
            filter,
        }]
    }

    #[test]
    fn test_create_verify_and_list() {
        let site = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        fs::write(site.path().join("index.php"), "v1").unwrap();
        fs::write(site.path().join(".env"), "KEY=1").unwrap();

        let manager = BackupManager::new(state.path().join("backups"));
        let record = manager
            .create(
                &code_root(site.path(), PathFilter::new([".env"])),
                &Version::new(1, 4, 0),
            )
            .unwrap();

        let name = record.file_name();
        assert!(name.starts_with("backup-"));
        assert!(name.ends_with("-v1.4.0.tar.gz"));
        assert!(record.size_bytes > 0);

        let entries = list_entries(&record.path).unwrap();
        assert_eq!(entries, vec!["app", "app/index.php"]);
        assert_eq!(manager.list().unwrap(), vec![record.clone()]);
        assert_eq!(manager.latest().unwrap(), Some(record));
    }

    #[test]
    fn test_empty_backup_is_rejected_and_deleted() {
        let site = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let manager = BackupManager::new(state.path());

        let result = manager.create(
            &code_root(site.path(), PathFilter::identity()),
            &Version::new(1, 0, 0),
        );

        assert!(matches!(result, Err(UpdateError::Backup { .. })));
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_missing_code_root_fails_backup() {
        let state = TempDir::new().unwrap();
        let manager = BackupManager::new(state.path());
        let result = manager.create(
            &code_root(&state.path().join("missing"), PathFilter::identity()),
            &Version::new(1, 0, 0),
        );
        assert!(matches!(result, Err(UpdateError::Backup { .. })));
    }

    #[test]
    fn test_list_ignores_other_files_and_missing_dir() {
        let state = TempDir::new().unwrap();
        let manager = BackupManager::new(state.path().join("backups"));
        assert!(manager.list().unwrap().is_empty());

        fs::create_dir_all(manager.dir()).unwrap();
        fs::write(manager.dir().join("notes.txt"), "x").unwrap();
        fs::write(manager.dir().join("backup-old.zip"), "x").unwrap();
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_restore_overwrites_and_respects_exclusions() {
        let site = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        fs::write(site.path().join("index.php"), "v1").unwrap();
        fs::write(site.path().join(".env"), "KEY=1").unwrap();

        let roots = code_root(site.path(), PathFilter::new([".env"]));
        let manager = BackupManager::new(state.path().join("backups"));
        let record = manager.create(&roots, &Version::new(1, 0, 0)).unwrap();

        fs::write(site.path().join("index.php"), "broken").unwrap();
        fs::write(site.path().join(".env"), "KEY=2").unwrap();

        let report = manager
            .restore(&record, &roots, &state.path().join("work"))
            .unwrap();

        assert_eq!(report.files_restored, 1);
        assert_eq!(fs::read_to_string(site.path().join("index.php")).unwrap(), "v1");
        assert_eq!(fs::read_to_string(site.path().join(".env")).unwrap(), "KEY=2");
        assert_eq!(fs::read_dir(state.path().join("work")).unwrap().count(), 0);
    }
}
