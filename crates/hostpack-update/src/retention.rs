//! Backup retention

use crate::backup::{sort_newest_first, BackupRecord};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Outcome of a prune
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub kept: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    /// Backups that should have been deleted but could not be
    pub failed: Vec<(PathBuf, String)>,
}

/// Keeps the N most recent backups
#[derive(Debug, Clone, Copy)]
pub struct BackupRetention {
    keep: usize,
}

impl BackupRetention {
    /// Retention keeping the `keep` newest backups. The newest backup is
    /// always kept, so `0` behaves like `1`.
    pub fn new(keep: usize) -> Self {
        Self { keep: keep.max(1) }
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Delete all but the `keep` newest of `backups`.
    ///
    /// Protected backups are never deleted, whatever their age. Deletion
    /// failures are logged and reported, not returned as errors.
    pub fn apply(&self, backups: &[BackupRecord], protected: &[PathBuf]) -> RetentionReport {
        let mut sorted = backups.to_vec();
        sort_newest_first(&mut sorted);

        let mut report = RetentionReport::default();
        for (index, backup) in sorted.into_iter().enumerate() {
            if index < self.keep || protected.contains(&backup.path) {
                report.kept.push(backup.path);
                continue;
            }

            match fs::remove_file(&backup.path) {
                Ok(()) => {
                    info!("Removed old backup {}", backup.path.display());
                    report.deleted.push(backup.path);
                }
                Err(e) => {
                    warn!("Failed to remove backup {}: {}", backup.path.display(), e);
                    report.failed.push((backup.path, e.to_string()));
                }
            }
        }

        debug!(
            "Retention kept {}, removed {}, failed {}",
            report.kept.len(),
            report.deleted.len(),
            report.failed.len()
        );
        report
    }
}
