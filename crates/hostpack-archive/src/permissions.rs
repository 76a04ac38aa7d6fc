//! Fixed permission map reapplied after merges and restores.
//!
//! Permission bits stored in archives are not trusted across platforms, so
//! every non-excluded directory and file gets a known mode instead.

use crate::error::Result;
use crate::filter::PathFilter;
use crate::walker::WalkWarning;
use std::path::Path;

/// Mode for directories: traversable and writable by the owner
pub const DIR_MODE: u32 = 0o755;

/// Mode for files: readable and writable by the owner
pub const FILE_MODE: u32 = 0o644;

/// Apply [`DIR_MODE`]/[`FILE_MODE`] to `root` and everything below it that
/// `filter` does not exclude. Symlinks are left alone.
///
/// Returns the number of entries updated and any walk or chmod warnings.
#[cfg(unix)]
pub fn apply_permission_map(
    root: &Path,
    filter: &PathFilter,
) -> Result<(usize, Vec<WalkWarning>)> {
    use crate::error::ArchiveError;
    use crate::walker::{EntryKind, TreeWalker, WarningKind};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tracing::{debug, warn};

    let set_mode =
        |path: &Path, mode: u32| fs::set_permissions(path, fs::Permissions::from_mode(mode));

    set_mode(root, DIR_MODE).map_err(|e| ArchiveError::io(root, e))?;

    let mut walk = TreeWalker::new(root, filter.clone()).walk()?;
    let mut updated = 1;
    let mut failures = Vec::new();

    for entry in walk.by_ref() {
        let mode = match entry.kind {
            EntryKind::Dir => DIR_MODE,
            EntryKind::File => FILE_MODE,
            EntryKind::Symlink { .. } => continue,
        };
        match set_mode(&entry.absolute_path, mode) {
            Ok(()) => updated += 1,
            Err(e) => {
                warn!(
                    "Cannot set permissions on {}: {}",
                    entry.absolute_path.display(),
                    e
                );
                failures.push(WalkWarning {
                    path: entry.absolute_path,
                    kind: WarningKind::Unreadable,
                    message: format!("cannot set permissions: {}", e),
                });
            }
        }
    }

    let mut warnings = walk.into_warnings();
    warnings.extend(failures);
    debug!(
        "Applied permission map to {} entries under {}",
        updated,
        root.display()
    );
    Ok((updated, warnings))
}

/// No-op outside unix; archive permissions are not applied there either.
#[cfg(not(unix))]
pub fn apply_permission_map(
    _root: &Path,
    _filter: &PathFilter,
) -> Result<(usize, Vec<WalkWarning>)> {
    Ok((0, Vec::new()))
}
