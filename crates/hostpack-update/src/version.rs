//! Version parsing and comparison

use crate::error::{Result, UpdateError};
use semver::Version;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Version assumed when the deployment manifest does not name one
pub const DEFAULT_VERSION: Version = Version::new(1, 0, 0);

/// Parse a release tag or manifest version.
///
/// A leading `v` is stripped and missing minor/patch components are filled
/// with zeros, so `v1.2` reads as `1.2.0`.
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let split = bare.find(['-', '+']).unwrap_or(bare.len());
    let (core, suffix) = bare.split_at(split);
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => bare.to_string(),
    };

    Version::parse(&padded).map_err(|e| UpdateError::invalid_version(raw, e))
}

/// Whether `latest` is strictly newer than `current`
pub fn compare(current: &Version, latest: &Version) -> bool {
    latest > current
}

/// Parse both versions and report whether an update is available
pub fn has_update(current: &str, latest: &str) -> Result<bool> {
    Ok(compare(&parse_version(current)?, &parse_version(latest)?))
}

/// Read the deployed version from the manifest's `version` field.
///
/// A missing manifest or field yields [`DEFAULT_VERSION`]; a manifest that
/// is not JSON or names an invalid version is an error.
pub fn current_version(manifest: &Path) -> Result<Version> {
    let content = match fs::read_to_string(manifest) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(
                "No manifest at {}, assuming {}",
                manifest.display(),
                DEFAULT_VERSION
            );
            return Ok(DEFAULT_VERSION);
        }
        Err(e) => {
            return Err(UpdateError::invalid_version(
                manifest.display().to_string(),
                e,
            ))
        }
    };

    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        UpdateError::invalid_version(
            manifest.display().to_string(),
            format!("manifest is not valid JSON: {}", e),
        )
    })?;

    match value.get("version").and_then(|v| v.as_str()) {
        Some(version) => parse_version(version),
        None => Ok(DEFAULT_VERSION),
    }
}
