//! Configuration file loading and parsing

use crate::error::{Error, Result};
use crate::types::{
    BackupConfig, ExclusionsConfig, LayoutConfig, NetworkConfig, PostTasksConfig, ReleaseConfig,
};
use crate::utils::get_home_dir;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["hostpack.yaml", "hostpack.yml"];

/// State directory name under the home directory
const STATE_DIR_NAME: &str = ".hostpack";

/// Complete hostpack configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostpackConfig {
    /// Network and HTTP configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Release feed settings
    #[serde(default)]
    pub release: ReleaseConfig,

    /// Deployment layout
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Exclusion rule sets per root and operation
    #[serde(default)]
    pub exclusions: ExclusionsConfig,

    /// Backup policy
    #[serde(default)]
    pub backup: BackupConfig,

    /// Post-update tasks
    #[serde(default)]
    pub post_tasks: PostTasksConfig,

    /// Directory for backups, the update lock and scratch space
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Path the configuration was loaded from
    #[serde(skip)]
    pub source_path: Option<Utf8PathBuf>,
}

impl HostpackConfig {
    /// Load configuration from the specified path or search for it.
    ///
    /// An explicit path must exist. Without one, the current directory and
    /// its parents are searched; if nothing is found the defaults are used
    /// with the current directory as the code root.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let found = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::config_not_found(p.as_str())
                    } else {
                        Error::Io(e)
                    }
                })?;
                Some((p.to_owned(), content))
            }
            None => Self::find_config()?,
        };

        let (mut config, base_dir) = match found {
            Some((config_path, content)) => {
                debug!("Loading configuration from {}", config_path);
                let mut config = Self::from_yaml(&content)?;
                let base_dir = config_path
                    .parent()
                    .filter(|p| !p.as_str().is_empty())
                    .map(|p| p.as_std_path().to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."));
                config.source_path = Some(config_path);
                (config, base_dir)
            }
            None => {
                debug!("No configuration file found, using defaults");
                (Self::default(), std::env::current_dir()?)
            }
        };

        config.resolve_relative_paths(&base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        Ok(config)
    }

    /// Find a configuration file in the current directory or its parents
    fn find_config() -> Result<Option<(Utf8PathBuf, String)>> {
        let cwd = std::env::current_dir()?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|_| Error::invalid_config("Current directory path is not valid UTF-8"))?;

        let mut current = cwd.as_path();
        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let content = fs::read_to_string(&path)?;
                    return Ok(Some((path, content)));
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// Make relative roots relative to the configuration file's directory
    fn resolve_relative_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &Path| -> PathBuf {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            }
        };

        self.layout.code_root = resolve(&self.layout.code_root);
        self.layout.public_root = self.layout.public_root.as_deref().map(resolve);
        self.state_dir = self.state_dir.as_deref().map(resolve);
        self.backup.dir = self.backup.dir.as_deref().map(resolve);
    }

    /// Validate values that have no sensible fallback
    pub fn validate(&self) -> Result<()> {
        if self.backup.retention == 0 {
            return Err(Error::invalid_config("backup.retention must be at least 1"));
        }
        if self.layout.marker_files.is_empty() {
            return Err(Error::invalid_config(
                "layout.marker-files must name at least one file",
            ));
        }
        let label = &self.layout.public_label;
        if label.is_empty() || label.contains('/') || label.contains('\\') || label == ".." {
            return Err(Error::invalid_config(format!(
                "layout.public-label must be a single directory name, got '{}'",
                label
            )));
        }
        if !self.release.archive_extension.starts_with('.') {
            return Err(Error::invalid_config(format!(
                "release.archive-extension must start with '.', got '{}'",
                self.release.archive_extension
            )));
        }
        Ok(())
    }

    /// Directory for backups, the update lock and scratch space
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_home_dir()?.join(STATE_DIR_NAME)),
        }
    }

    /// Directory holding backups
    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.backup.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.state_dir()?.join("backups")),
        }
    }

    /// Path of the update lock file
    pub fn lock_path(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join("update.lock"))
    }
}
