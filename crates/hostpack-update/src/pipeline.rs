//! The update state machine
//!
//! One invocation moves a deployment from its current release to a newer
//! one: check, back up, download, extract, locate the payload, merge, run
//! post-tasks and clean up. A failure while merging undoes what the merge
//! created and restores the backup taken at the start.

use crate::backup::{BackupManager, BackupRecord};
use crate::context::{Operation, UpdateContext};
use crate::download::PackageDownloader;
use crate::error::{Result, UpdateError};
use crate::lock::UpdateLock;
use crate::post_tasks::{self, PostTask, TaskContext};
use crate::releases::{ReleaseClient, ReleaseDescriptor};
use crate::version::{compare, current_version};
use hostpack_archive::{
    extract_archive, locate_root, DirectoryMerger, MergeJournal, MAX_PAYLOAD_DEPTH,
};
use semver::Version;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Pipeline states, in the order a successful update visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    CheckingUpdate,
    BackingUp,
    Downloading,
    Extracting,
    LocatingRoot,
    Merging,
    RunningPostTasks,
    CleaningUp,
    Done,
    Failed,
    RolledBack,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CheckingUpdate => "checking-update",
            Self::BackingUp => "backing-up",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::LocatingRoot => "locating-root",
            Self::Merging => "merging",
            Self::RunningPostTasks => "running-post-tasks",
            Self::CleaningUp => "cleaning-up",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::RolledBack => "rolled-back",
        };
        f.write_str(name)
    }
}

/// Result of comparing the deployed version with the latest release
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCheck {
    pub current: Version,
    pub latest: ReleaseDescriptor,
    pub update_available: bool,
}

/// Look up the latest release and compare it with the deployed version
pub async fn check_release(ctx: &UpdateContext) -> Result<UpdateCheck> {
    let current = current_version(&ctx.manifest_path())?;
    let latest = ReleaseClient::new(&ctx.release, &ctx.network)?
        .fetch_latest()
        .await?;
    let update_available = compare(&current, &latest.version);
    debug!(
        "Current {}, latest {}, update available: {}",
        current, latest.version, update_available
    );
    Ok(UpdateCheck {
        current,
        latest,
        update_available,
    })
}

/// How an invocation ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// No newer release; nothing was touched
    UpToDate { current: Version, latest: Version },

    /// The deployment now runs `to`
    Updated {
        from: Version,
        to: Version,
        backup: PathBuf,
        /// Best-effort failures (post-tasks, cleanup)
        warnings: Vec<String>,
        /// Backups removed by retention
        pruned: Vec<PathBuf>,
    },
}

/// Drives one update invocation and records the states it passes through
pub struct UpdatePipeline {
    ctx: UpdateContext,
    tasks: Vec<Box<dyn PostTask>>,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl UpdatePipeline {
    pub fn new(ctx: UpdateContext) -> Self {
        let tasks = post_tasks::default_tasks(&ctx);
        Self {
            ctx,
            tasks,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    /// Replace the post-task list
    pub fn with_post_tasks(mut self, tasks: Vec<Box<dyn PostTask>>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn context(&self) -> &UpdateContext {
        &self.ctx
    }

    /// Check for a newer release and install it if there is one
    pub async fn run(&mut self) -> Result<UpdateOutcome> {
        self.transition(PipelineState::CheckingUpdate);

        let check = match check_release(&self.ctx).await {
            Ok(check) => check,
            Err(e) => return Err(self.fail(e)),
        };

        if !check.update_available {
            info!("Already up to date ({})", check.current);
            self.transition(PipelineState::Idle);
            return Ok(UpdateOutcome::UpToDate {
                current: check.current,
                latest: check.latest.version,
            });
        }

        info!("Updating {} -> {}", check.current, check.latest.version);
        self.install_from(check.current, check.latest).await
    }

    /// Install `descriptor` without consulting the release feed
    pub async fn install(&mut self, descriptor: ReleaseDescriptor) -> Result<UpdateOutcome> {
        let current = match current_version(&self.ctx.manifest_path()) {
            Ok(version) => version,
            Err(e) => return Err(self.fail(e)),
        };
        self.install_from(current, descriptor).await
    }

    async fn install_from(
        &mut self,
        current: Version,
        descriptor: ReleaseDescriptor,
    ) -> Result<UpdateOutcome> {
        match self.install_stages(current, descriptor).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn install_stages(
        &mut self,
        current: Version,
        descriptor: ReleaseDescriptor,
    ) -> Result<UpdateOutcome> {
        self.transition(PipelineState::BackingUp);
        let _lock = UpdateLock::acquire(&self.ctx.lock_path)?;

        let backups = BackupManager::new(&self.ctx.backup_dir)
            .with_compression_level(self.ctx.compression_level)
            .with_progress(self.ctx.show_progress);
        let backup = backups.create(&self.ctx.roots(Operation::Backup), &current)?;

        self.transition(PipelineState::Downloading);
        fs::create_dir_all(&self.ctx.work_dir).map_err(|e| {
            UpdateError::download(format!("cannot create {}: {}", self.ctx.work_dir.display(), e))
        })?;
        let work = tempfile::Builder::new()
            .prefix("update-")
            .tempdir_in(&self.ctx.work_dir)
            .map_err(|e| UpdateError::download(format!("cannot create work directory: {}", e)))?;
        let package = PackageDownloader::new(&self.ctx.network)?
            .with_progress(self.ctx.show_progress)
            .download(&descriptor, work.path())
            .await?;

        self.transition(PipelineState::Extracting);
        let extracted = work.path().join("payload");
        let entries = extract_archive(&package.file_path, &extracted)
            .map_err(UpdateError::archive_corrupt)?;
        debug!("Extracted {} entries", entries);

        self.transition(PipelineState::LocatingRoot);
        let payload_root = locate_root(&extracted, &self.ctx.marker_files, MAX_PAYLOAD_DEPTH)
            .map_err(UpdateError::payload_structure)?;
        let public_payload = self
            .ctx
            .public_root
            .as_ref()
            .and_then(|_| self.ctx.public_payload(&extracted, &payload_root));

        self.transition(PipelineState::Merging);
        let mut journals = Vec::new();
        if let Err(e) = self.merge_payload(&payload_root, public_payload.as_deref(), &mut journals)
        {
            return Err(self.roll_back(e, &journals, &backups, &backup));
        }

        self.transition(PipelineState::RunningPostTasks);
        let task_ctx = TaskContext::from_update_context(&self.ctx);
        let mut warnings = post_tasks::run_all(&self.tasks, &task_ctx);

        self.transition(PipelineState::CleaningUp);
        if let Err(e) = work.close() {
            warn!("Failed to remove work directory: {}", e);
            warnings.push(format!("work directory not removed: {}", e));
        }
        let pruned = match backups.prune(self.ctx.retention, &[backup.path.clone()]) {
            Ok(report) => {
                warnings.extend(
                    report
                        .failed
                        .iter()
                        .map(|(path, e)| format!("backup {} not removed: {}", path.display(), e)),
                );
                report.deleted
            }
            Err(e) => {
                warn!("Backup retention skipped: {}", e);
                warnings.push(e.to_string());
                Vec::new()
            }
        };

        self.transition(PipelineState::Done);
        info!("Updated {} -> {}", current, descriptor.version);

        Ok(UpdateOutcome::Updated {
            from: current,
            to: descriptor.version,
            backup: backup.path,
            warnings,
            pruned,
        })
    }

    /// Merge the code payload, then the public payload. Each merge's journal
    /// is pushed to `journals`, including a partial one on failure.
    fn merge_payload(
        &self,
        payload_root: &Path,
        public_payload: Option<&Path>,
        journals: &mut Vec<MergeJournal>,
    ) -> Result<()> {
        let mut targets = vec![(
            payload_root,
            self.ctx.code_root.as_path(),
            self.ctx.code_filter(Operation::Merge),
        )];
        match (&self.ctx.public_root, public_payload) {
            (Some(public_root), Some(source)) => {
                targets.push((
                    source,
                    public_root.as_path(),
                    self.ctx.public_filter(Operation::Merge),
                ));
            }
            (Some(_), None) => warn!("Package has no '{}' directory", self.ctx.public_label),
            (None, _) => {}
        }

        for (source, dest, filter) in targets {
            info!("Merging {} into {}", source.display(), dest.display());
            match DirectoryMerger::new(filter)
                .with_progress(self.ctx.show_progress)
                .merge(source, dest)
            {
                Ok(report) => {
                    debug!(
                        "Merged {} files, {} directories, {} symlinks",
                        report.files_copied, report.dirs_created, report.symlinks_created
                    );
                    journals.push(report.journal);
                }
                Err(failure) => {
                    journals.push(failure.journal);
                    return Err(UpdateError::merge(failure.error));
                }
            }
        }
        Ok(())
    }

    /// Undo the partial merge and restore the backup. Returns the error the
    /// invocation fails with: the merge error once the deployment is back to
    /// its pre-update state, otherwise a rollback error naming the backup.
    fn roll_back(
        &mut self,
        cause: UpdateError,
        journals: &[MergeJournal],
        backups: &BackupManager,
        backup: &BackupRecord,
    ) -> UpdateError {
        error!("{}; rolling back from {}", cause, backup.path.display());

        let mut leftovers = Vec::new();
        for journal in journals.iter().rev() {
            if let Err(e) = journal.undo() {
                warn!("Could not undo part of the merge: {}", e);
                leftovers.push(e.to_string());
            }
        }

        match backups.restore(backup, &self.ctx.roots(Operation::Backup), &self.ctx.work_dir) {
            Ok(report) if leftovers.is_empty() => {
                info!(
                    "Rolled back: {} files restored from {}",
                    report.files_restored,
                    backup.path.display()
                );
                self.transition(PipelineState::RolledBack);
                cause
            }
            Ok(_) => {
                error!("Backup restored, but files added by the update may remain");
                UpdateError::rollback(
                    backup.path.clone(),
                    format!(
                        "files added by the update may remain ({}) (after: {})",
                        leftovers.join("; "),
                        cause
                    ),
                )
            }
            Err(e) => {
                error!("Rollback failed: {}", e);
                UpdateError::rollback(backup.path.clone(), format!("{} (after: {})", e, cause))
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("Pipeline: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, error: UpdateError) -> UpdateError {
        warn!("Update failed in state {}: {}", self.state, error);
        self.transition(PipelineState::Failed);
        error
    }
}

impl fmt::Debug for UpdatePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdatePipeline")
            .field("state", &self.state)
            .field("history", &self.history)
            .field("tasks", &self.tasks.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pipeline_is_idle() {
        let mut config = hostpack_core::HostpackConfig::default();
        config.state_dir = Some(PathBuf::from("/tmp/hostpack-state"));
        let ctx = UpdateContext::from_config(&config).unwrap();
        let pipeline = UpdatePipeline::new(ctx);

        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.history(), &[PipelineState::Idle]);
    }

    fn rollback_fixture(temp: &tempfile::TempDir) -> (UpdatePipeline, BackupManager, BackupRecord) {
        let site = temp.path().join("site");
        fs::create_dir_all(&site).unwrap();
        fs::write(site.join("index.php"), "v1").unwrap();

        let mut config = hostpack_core::HostpackConfig::default();
        config.state_dir = Some(temp.path().join("state"));
        config.layout.code_root = site;
        let ctx = UpdateContext::from_config(&config).unwrap();

        let backups = BackupManager::new(&ctx.backup_dir);
        let record = backups
            .create(&ctx.roots(Operation::Backup), &Version::new(1, 0, 0))
            .unwrap();
        (UpdatePipeline::new(ctx), backups, record)
    }

    #[test]
    fn test_roll_back_restores_and_keeps_merge_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut pipeline, backups, record) = rollback_fixture(&temp);
        let site = pipeline.context().code_root.clone();
        fs::write(site.join("index.php"), "v2").unwrap();
        fs::write(site.join("added.php"), "new").unwrap();
        let journal = MergeJournal {
            created_files: vec![site.join("added.php")],
            overwritten_files: vec![site.join("index.php")],
            ..MergeJournal::default()
        };

        let err = pipeline.roll_back(UpdateError::merge("disk full"), &[journal], &backups, &record);

        assert!(matches!(err, UpdateError::Merge { .. }), "got {:?}", err);
        assert_eq!(pipeline.state(), PipelineState::RolledBack);
        assert_eq!(fs::read_to_string(site.join("index.php")).unwrap(), "v1");
        assert!(!site.join("added.php").exists());
    }

    #[test]
    fn test_roll_back_with_undo_failure_is_a_rollback_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut pipeline, backups, record) = rollback_fixture(&temp);
        let site = pipeline.context().code_root.clone();
        // Removing a directory as if it were a file fails for any user
        fs::create_dir_all(site.join("cache/views")).unwrap();
        let journal = MergeJournal {
            created_files: vec![site.join("cache")],
            ..MergeJournal::default()
        };

        let err = pipeline.roll_back(UpdateError::merge("disk full"), &[journal], &backups, &record);

        match &err {
            UpdateError::Rollback { backup, message } => {
                assert_eq!(backup, &record.path);
                assert!(message.contains("may remain"), "message: {}", message);
            }
            other => panic!("expected Rollback, got {:?}", other),
        }
        assert!(err.to_string().contains(&record.path.display().to_string()));
        assert!(!pipeline.history().contains(&PipelineState::RolledBack));
        // The backup is still applied
        assert_eq!(fs::read_to_string(site.join("index.php")).unwrap(), "v1");
    }

    #[test]
    fn test_state_names() {
        assert_eq!(PipelineState::RunningPostTasks.to_string(), "running-post-tasks");
        assert_eq!(
            serde_json::to_string(&PipelineState::RolledBack).unwrap(),
            "\"rolled_back\""
        );
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = UpdateOutcome::UpToDate {
            current: Version::new(2, 0, 0),
            latest: Version::new(2, 0, 0),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "up_to_date");
        assert_eq!(json["current"], "2.0.0");
    }
}
