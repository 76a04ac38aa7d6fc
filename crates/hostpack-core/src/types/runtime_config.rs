//! Runtime configuration types for operational parameters
//!
//! These types define configuration that controls the packaging and update
//! pipeline: network timeouts, the release feed, the deployment layout, the
//! per-operation exclusion rule sets, backup policy and post-update tasks.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Network and HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Timeout for release metadata requests in seconds
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,

    /// Timeout for package downloads in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            metadata_timeout_secs: default_metadata_timeout(),
            download_timeout_secs: default_download_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_metadata_timeout() -> u64 {
    15
}
fn default_download_timeout() -> u64 {
    600 // 10 minutes
}
fn default_user_agent() -> String {
    format!(
        "hostpack/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Release feed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseConfig {
    /// Base URL of the releases API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Repository identifier ("owner/name")
    #[serde(default)]
    pub repo: String,

    /// Substring identifying the deployable package among release assets
    #[serde(default = "default_package_marker")]
    pub package_marker: String,

    /// Expected package archive extension
    #[serde(default = "default_archive_extension")]
    pub archive_extension: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            repo: String::new(),
            package_marker: default_package_marker(),
            archive_extension: default_archive_extension(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_package_marker() -> String {
    "app-package".to_string()
}
fn default_archive_extension() -> String {
    ".zip".to_string()
}

/// Deployment layout
///
/// The application code root and the public-facing root may be nested (the
/// public root lives inside the code root) or split into sibling directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LayoutConfig {
    /// Application code root
    #[serde(default = "default_code_root")]
    pub code_root: PathBuf,

    /// Public-facing root when deployed as a sibling of the code root
    #[serde(default)]
    pub public_root: Option<PathBuf>,

    /// Files identifying the application root inside a package
    #[serde(default = "default_marker_files")]
    pub marker_files: Vec<String>,

    /// Manifest file (relative to the code root) holding the `version` field
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Directory name of the public assets inside packages and backups
    #[serde(default = "default_public_label")]
    pub public_label: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            code_root: default_code_root(),
            public_root: None,
            marker_files: default_marker_files(),
            manifest_file: default_manifest_file(),
            public_label: default_public_label(),
        }
    }
}

impl LayoutConfig {
    /// Whether the public root is a separate sibling directory
    pub fn is_split(&self) -> bool {
        self.public_root.is_some()
    }
}

fn default_code_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_marker_files() -> Vec<String> {
    vec!["app.manifest.json".to_string()]
}
fn default_manifest_file() -> String {
    "app.manifest.json".to_string()
}
fn default_public_label() -> String {
    "public".to_string()
}

/// Exclusion rule sets for one deployment root, per operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RootExclusions {
    /// Rules applied when building a deployable package
    #[serde(default)]
    pub package: Vec<String>,

    /// Rules applied when backing up the live deployment
    #[serde(default)]
    pub backup: Vec<String>,

    /// Rules applied when merging an update into the deployment
    #[serde(default)]
    pub merge: Vec<String>,
}

/// Exclusion rule sets for the code root and the public root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExclusionsConfig {
    /// Application code root rules
    #[serde(default = "default_code_exclusions")]
    pub code: RootExclusions,

    /// Public root rules
    #[serde(default = "default_public_exclusions")]
    pub public: RootExclusions,
}

impl Default for ExclusionsConfig {
    fn default() -> Self {
        Self {
            code: default_code_exclusions(),
            public: default_public_exclusions(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_code_exclusions() -> RootExclusions {
    // Local environment and persisted data are never shipped, backed up
    // over, or overwritten by a package.
    let protected = strings(&[".env", "storage", ".git"]);
    RootExclusions {
        package: strings(&[
            ".git",
            ".github",
            ".env",
            "node_modules",
            "storage",
            "tests",
        ]),
        backup: protected.clone(),
        merge: protected,
    }
}

fn default_public_exclusions() -> RootExclusions {
    // Build-tool scratch files only.
    let scratch = strings(&["hot", "storage"]);
    RootExclusions {
        package: scratch.clone(),
        backup: scratch.clone(),
        merge: scratch,
    }
}

/// Backup policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackupConfig {
    /// Backup directory (defaults to `<state-dir>/backups`)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Number of backups to keep
    #[serde(default = "default_retention")]
    pub retention: usize,

    /// Compression level (1-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention: default_retention(),
            compression_level: default_compression_level(),
        }
    }
}

fn default_retention() -> usize {
    3
}
fn default_compression_level() -> u32 {
    6
}

/// An external command run after a successful merge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,

    /// Program arguments
    #[serde(default)]
    pub args: Vec<String>,
}

/// Post-update tasks (best-effort)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PostTasksConfig {
    /// Cache directories (relative to the code root) whose contents are cleared
    #[serde(default)]
    pub clear_cache_dirs: Vec<String>,

    /// Commands run in the code root, in order
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}
