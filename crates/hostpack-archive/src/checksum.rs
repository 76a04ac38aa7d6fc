//! SHA-256 checksums for packages and backups

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Calculates the SHA-256 checksum of a file as lowercase hex.
pub fn calculate_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Extracts the digest from a `sha256sum`-style sidecar (`<hex>  <name>`).
///
/// Returns `None` when the first token is not a 64-character hex string.
pub fn parse_checksum_line(content: &str) -> Option<String> {
    let digest = content.split_whitespace().next()?;
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_ascii_lowercase())
    } else {
        None
    }
}
