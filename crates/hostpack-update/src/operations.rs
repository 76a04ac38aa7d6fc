//! Operation entry points
//!
//! Each operation returns an [`OperationResult`] instead of an error so
//! callers (the CLI, or anything embedding the updater) get a uniform,
//! JSON-serializable answer.

use crate::backup::BackupManager;
use crate::context::{Operation, UpdateContext};
use crate::error::{Result, UpdateError};
use crate::lock::UpdateLock;
use crate::pipeline::{check_release, UpdateOutcome, UpdatePipeline};
use crate::releases::ReleaseDescriptor;
use crate::retention::RetentionReport;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

/// Uniform operation answer
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    /// A failed operation; `data` classifies the error
    pub fn failure(error: &UpdateError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: Some(json!({
                "kind": error.kind(),
                "severity": error.severity(),
                "retryable": error.is_retryable(),
            })),
        }
    }

    /// Add a field to an object-valued `data`, creating it if absent
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        match &mut self.data {
            Some(Value::Object(map)) => {
                map.insert(key.to_string(), value);
            }
            _ => {
                let mut map = serde_json::Map::new();
                map.insert(key.to_string(), value);
                self.data = Some(Value::Object(map));
            }
        }
        self
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Report whether a newer release is available
pub async fn check_for_updates(ctx: &UpdateContext) -> OperationResult {
    match check_release(ctx).await {
        Ok(check) => {
            let message = if check.update_available {
                format!(
                    "Update available: {} -> {}",
                    check.current, check.latest.version
                )
            } else {
                format!("Up to date ({})", check.current)
            };
            OperationResult::ok(message, Some(to_value(&check)))
        }
        Err(e) => OperationResult::failure(&e),
    }
}

/// Run the update pipeline.
///
/// With `url` and `version` the given package is installed without
/// consulting the release feed; with neither, the latest release is
/// installed if it is newer. Giving only one of them is an error.
pub async fn perform_update(
    ctx: &UpdateContext,
    url: Option<&str>,
    version: Option<&str>,
) -> OperationResult {
    let descriptor = match direct_descriptor(ctx, url, version) {
        Ok(descriptor) => descriptor,
        Err(e) => return OperationResult::failure(&e),
    };

    let mut pipeline = UpdatePipeline::new(ctx.clone());
    let result = match descriptor {
        Some(descriptor) => pipeline.install(descriptor).await,
        None => pipeline.run().await,
    };
    let history = to_value(&pipeline.history());

    match result {
        Ok(outcome) => {
            let message = match &outcome {
                UpdateOutcome::UpToDate { current, .. } => {
                    format!("Already up to date ({})", current)
                }
                UpdateOutcome::Updated { from, to, .. } => {
                    format!("Updated {} -> {}", from, to)
                }
            };
            OperationResult::ok(message, Some(to_value(&outcome))).with_field("history", history)
        }
        Err(e) => OperationResult::failure(&e).with_field("history", history),
    }
}

fn direct_descriptor(
    ctx: &UpdateContext,
    url: Option<&str>,
    version: Option<&str>,
) -> Result<Option<ReleaseDescriptor>> {
    match (url, version) {
        (Some(url), Some(version)) => Ok(Some(ReleaseDescriptor::from_url(
            url,
            version,
            &ctx.release.archive_extension,
        )?)),
        (None, None) => Ok(None),
        _ => Err(hostpack_core::Error::invalid_config(
            "a package url and its version must be given together",
        )
        .into()),
    }
}

/// Restore the most recent backup over the deployment
pub fn restore_latest_backup(ctx: &UpdateContext) -> OperationResult {
    match restore_latest(ctx) {
        Ok(data) => OperationResult::ok(
            format!(
                "Restored {}",
                data["backup"].as_str().unwrap_or("latest backup")
            ),
            Some(data),
        ),
        Err(e) => OperationResult::failure(&e),
    }
}

fn restore_latest(ctx: &UpdateContext) -> Result<Value> {
    let _lock = UpdateLock::acquire(&ctx.lock_path)?;

    let manager = BackupManager::new(&ctx.backup_dir).with_progress(ctx.show_progress);
    let record = manager.latest()?.ok_or_else(|| {
        UpdateError::restore(format!("no backups in {}", ctx.backup_dir.display()))
    })?;

    info!("Restoring latest backup {}", record.file_name());
    let report = manager.restore(&record, &ctx.roots(Operation::Backup), &ctx.work_dir)?;

    Ok(json!({
        "backup": record.path,
        "created_at": record.created_at,
        "files_restored": report.files_restored,
        "warnings": report.warnings,
    }))
}

/// Prune old backups under the update lock.
///
/// `keep` defaults to the configured retention. Holding the lock keeps a
/// prune from deleting the backup an in-flight update or restore relies on.
pub fn prune_backups(ctx: &UpdateContext, keep: Option<usize>) -> OperationResult {
    match prune(ctx, keep.unwrap_or(ctx.retention)) {
        Ok(report) => OperationResult::ok(
            format!(
                "Kept {}, removed {} backup(s)",
                report.kept.len(),
                report.deleted.len()
            ),
            Some(to_value(&report)),
        ),
        Err(e) => OperationResult::failure(&e),
    }
}

fn prune(ctx: &UpdateContext, keep: usize) -> Result<RetentionReport> {
    if keep == 0 {
        return Err(
            hostpack_core::Error::invalid_config("at least one backup must be kept").into(),
        );
    }
    let _lock = UpdateLock::acquire(&ctx.lock_path)?;
    BackupManager::new(&ctx.backup_dir).prune(keep, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostpack_core::HostpackConfig;
    use std::fs;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> UpdateContext {
        let mut config = HostpackConfig::default();
        config.state_dir = Some(temp.path().join("state"));
        config.layout.code_root = temp.path().join("site");
        config.release.repo = "acme/billing".to_string();
        UpdateContext::from_config(&config).unwrap()
    }

    #[test]
    fn test_failure_carries_classification() {
        let result = OperationResult::failure(&UpdateError::network("connection reset"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["data"]["kind"], "network");
        assert_eq!(json["data"]["severity"], "recoverable");
        assert_eq!(json["data"]["retryable"], true);
    }

    #[test]
    fn test_ok_without_data_omits_field() {
        let json = serde_json::to_value(OperationResult::ok("done", None)).unwrap();
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn test_url_without_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        let result =
            perform_update(&context(&temp), Some("https://example.com/p.zip"), None).await;
        assert!(!result.success);
        assert_eq!(result.data.unwrap()["kind"], "config");
    }

    fn seed_backups(ctx: &UpdateContext, count: usize) -> BackupManager {
        fs::create_dir_all(&ctx.code_root).unwrap();
        fs::write(ctx.code_root.join("index.php"), "v1").unwrap();
        let manager = BackupManager::new(&ctx.backup_dir);
        for _ in 0..count {
            manager
                .create(&ctx.roots(Operation::Backup), &semver::Version::new(1, 0, 0))
                .unwrap();
        }
        manager
    }

    #[test]
    fn test_prune_keeps_requested_count() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let manager = seed_backups(&ctx, 3);

        let result = prune_backups(&ctx, Some(1));

        assert!(result.success, "{}", result.message);
        assert_eq!(manager.list().unwrap().len(), 1);
        assert!(!ctx.lock_path.exists());
    }

    #[test]
    fn test_prune_rejects_keep_zero() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let manager = seed_backups(&ctx, 1);

        let result = prune_backups(&ctx, Some(0));

        assert!(!result.success);
        assert_eq!(result.data.unwrap()["kind"], "config");
        assert_eq!(manager.list().unwrap().len(), 1);
    }

    #[test]
    fn test_prune_fails_fast_while_locked() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let manager = seed_backups(&ctx, 2);
        let _held = UpdateLock::acquire(&ctx.lock_path).unwrap();

        let result = prune_backups(&ctx, Some(1));

        assert!(!result.success);
        assert_eq!(result.data.unwrap()["kind"], "concurrent_update");
        assert_eq!(manager.list().unwrap().len(), 2);
    }

    #[test]
    fn test_restore_without_backups_fails() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        fs::create_dir_all(&ctx.code_root).unwrap();

        let result = restore_latest_backup(&ctx);
        assert!(!result.success);
        assert_eq!(result.data.unwrap()["kind"], "restore");
        assert!(!ctx.lock_path.exists());
    }
}
