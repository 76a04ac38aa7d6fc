//! Update lock guarding the deployment against concurrent invocations

use crate::error::{Result, UpdateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lock file content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Held update lock; the lock file is removed when the guard is dropped.
///
/// The file is created with create-new semantics, so its existence alone
/// means the lock is held. A crashed invocation leaves the file behind and
/// it must be removed by hand.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
}

impl UpdateLock {
    /// Acquire the lock at `path`, failing fast if it is already held
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UpdateError::backup(format!(
                    "cannot create lock directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if let Some(holder) = Self::holder(path) {
                    debug!(
                        "Lock {} held by pid {} since {}",
                        path.display(),
                        holder.pid,
                        holder.started_at
                    );
                }
                return Err(UpdateError::ConcurrentUpdate {
                    lock: path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(UpdateError::backup(format!(
                    "cannot create lock file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        // The guard owns the file from here on, so a failed write still
        // releases it.
        let lock = Self {
            path: path.to_path_buf(),
        };

        let info = LockInfo {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let content = serde_json::to_string(&info)
            .map_err(|e| UpdateError::backup(format!("cannot serialize lock content: {}", e)))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                UpdateError::backup(format!("cannot write lock file {}: {}", path.display(), e))
            })?;

        debug!("Acquired update lock {}", path.display());
        Ok(lock)
    }

    /// Read who holds the lock at `path`, if anyone
    pub fn holder(path: &Path) -> Option<LockInfo> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        } else {
            debug!("Released update lock {}", self.path.display());
        }
    }
}
