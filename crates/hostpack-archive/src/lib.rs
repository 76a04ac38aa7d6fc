//! Hostpack archive layer
//!
//! Everything that touches a deployment tree goes through one exclusion
//! matcher ([`PathFilter`]) and one walker ([`TreeWalker`]):
//!
//! - **Packaging**: [`ArchiveWriter`] combines one or more walked roots under
//!   top-level labels into a zip or tar.gz archive, written atomically.
//! - **Extraction**: [`extract_archive`] and [`list_entries`] read both
//!   formats back.
//! - **Merging**: [`DirectoryMerger`] copies a payload over a deployment,
//!   never touching excluded destination paths, and journals what it
//!   changed so a failed merge can be undone. [`locate_root`] finds the
//!   real payload inside a wrapped package.
//! - **Permissions**: [`apply_permission_map`] reapplies the fixed
//!   directory/file modes after a merge, since archive modes are not trusted.
//!
//! # Example
//!
//! ```no_run
//! use hostpack_archive::{ArchiveSource, ArchiveWriter, PathFilter};
//! use std::path::Path;
//!
//! fn main() -> Result<(), hostpack_archive::ArchiveError> {
//!     let sources = vec![
//!         ArchiveSource::new("/srv/billing", "app", PathFilter::new([".env", "storage"])),
//!         ArchiveSource::new("/srv/public_html", "public", PathFilter::new(["hot"])),
//!     ];
//!
//!     let report = ArchiveWriter::new().build(Path::new("app-package-v2.zip"), &sources)?;
//!     println!("{} entries written", report.entry_count);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod checksum;
pub mod error;
pub mod extract;
pub mod filter;
pub mod merge;
pub mod permissions;
pub mod progress;
pub mod walker;

pub use archive::{
    ArchiveEntry, ArchiveFormat, ArchiveReport, ArchiveSource, ArchiveWriter, SkippedEntry,
    DEFAULT_COMPRESSION_LEVEL,
};
pub use checksum::{calculate_checksum, parse_checksum_line};
pub use error::{ArchiveError, Result};
pub use extract::{extract_archive, list_entries};
pub use filter::{normalize, PathFilter};
pub use merge::{
    locate_root, ConflictPolicy, DirectoryMerger, MergeFailure, MergeJournal, MergeReport,
    MAX_PAYLOAD_DEPTH,
};
pub use permissions::{apply_permission_map, DIR_MODE, FILE_MODE};
pub use walker::{EntryKind, TreeWalker, Walk, WalkEntry, WalkWarning, WarningKind};
