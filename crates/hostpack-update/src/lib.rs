//! Self-update pipeline for hostpack deployments
//!
//! Provides:
//! - Latest-release lookup and package asset resolution
//! - Semantic version comparison against the deployed manifest
//! - Package download with progress tracking and checksum verification
//! - Verified tar.gz backups, restore and retention
//! - An update lock guarding against concurrent invocations
//! - The update state machine with rollback on a failed merge
//! - Best-effort post-update tasks
//! - Operation entry points returning `{success, message, data}`

pub mod backup;
pub mod context;
pub mod download;
pub mod error;
pub mod lock;
pub mod operations;
pub mod pipeline;
pub mod post_tasks;
pub mod releases;
pub mod retention;
pub mod version;

pub use backup::{BackupManager, BackupRecord, RestoreReport};
pub use context::{DeploymentRoot, Operation, UpdateContext, CODE_LABEL};
pub use download::{DownloadResult, PackageDownloader};
pub use error::{ErrorKind, Result, Severity, UpdateError};
pub use lock::{LockInfo, UpdateLock};
pub use operations::{
    check_for_updates, perform_update, prune_backups, restore_latest_backup, OperationResult,
};
pub use pipeline::{check_release, PipelineState, UpdateCheck, UpdateOutcome, UpdatePipeline};
pub use post_tasks::{
    ClearCacheTask, CommandOutput, CommandTask, PermissionsTask, PostTask, TaskContext, TaskError,
};
pub use releases::{Release, ReleaseAsset, ReleaseClient, ReleaseDescriptor};
pub use retention::{BackupRetention, RetentionReport};
pub use version::{compare, current_version, has_update, parse_version, DEFAULT_VERSION};
