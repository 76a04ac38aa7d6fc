//! Resolved settings shared by every update component

use crate::error::Result;
use hostpack_archive::{ArchiveSource, PathFilter};
use hostpack_core::types::{
    ExclusionsConfig, NetworkConfig, PostTasksConfig, ReleaseConfig, RootExclusions,
};
use hostpack_core::HostpackConfig;
use std::path::{Path, PathBuf};

/// Archive label of the application code root
pub const CODE_LABEL: &str = "app";

/// Operation an exclusion rule set applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Package,
    Backup,
    Merge,
}

/// A deployment root together with its archive label and exclusions
#[derive(Debug, Clone)]
pub struct DeploymentRoot {
    pub label: String,
    pub path: PathBuf,
    pub filter: PathFilter,
}

/// Configuration resolved once per invocation and passed to each component
#[derive(Debug, Clone)]
pub struct UpdateContext {
    pub code_root: PathBuf,
    pub public_root: Option<PathBuf>,
    pub public_label: String,
    pub marker_files: Vec<String>,
    pub manifest_file: String,
    pub exclusions: ExclusionsConfig,
    pub release: ReleaseConfig,
    pub network: NetworkConfig,
    pub backup_dir: PathBuf,
    pub retention: usize,
    pub compression_level: u32,
    pub lock_path: PathBuf,
    /// Scratch space for downloads, extraction and restore staging
    pub work_dir: PathBuf,
    pub post_tasks: PostTasksConfig,
    pub show_progress: bool,
}

impl UpdateContext {
    pub fn from_config(config: &HostpackConfig) -> Result<Self> {
        let state_dir = config.state_dir()?;
        Ok(Self {
            code_root: config.layout.code_root.clone(),
            public_root: config.layout.public_root.clone(),
            public_label: config.layout.public_label.clone(),
            marker_files: config.layout.marker_files.clone(),
            manifest_file: config.layout.manifest_file.clone(),
            exclusions: config.exclusions.clone(),
            release: config.release.clone(),
            network: config.network.clone(),
            backup_dir: config.backup_dir()?,
            retention: config.backup.retention,
            compression_level: config.backup.compression_level,
            lock_path: config.lock_path()?,
            work_dir: state_dir.join("work"),
            post_tasks: config.post_tasks.clone(),
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Path of the manifest holding the deployed version
    pub fn manifest_path(&self) -> PathBuf {
        self.code_root.join(&self.manifest_file)
    }

    fn rules(set: &RootExclusions, operation: Operation) -> &[String] {
        match operation {
            Operation::Package => &set.package,
            Operation::Backup => &set.backup,
            Operation::Merge => &set.merge,
        }
    }

    /// Exclusions for the code root.
    ///
    /// With a separate public root the nested public directory is excluded
    /// so it is never shipped or merged; otherwise the public rules apply
    /// below `<code_root>/<public_label>`. Backup exclusions are narrowed to
    /// what the merge also leaves alone, so a rollback can restore
    /// everything a merge may have written.
    pub fn code_filter(&self, operation: Operation) -> PathFilter {
        let filter = self.configured_code_filter(operation);
        match operation {
            Operation::Backup => filter.narrowed_to(&self.configured_code_filter(Operation::Merge)),
            _ => filter,
        }
    }

    /// Exclusions for the public root, narrowed for backups like
    /// [`code_filter`](Self::code_filter)
    pub fn public_filter(&self, operation: Operation) -> PathFilter {
        let filter = PathFilter::new(Self::rules(&self.exclusions.public, operation));
        match operation {
            Operation::Backup => filter.narrowed_to(&PathFilter::new(Self::rules(
                &self.exclusions.public,
                Operation::Merge,
            ))),
            _ => filter,
        }
    }

    fn configured_code_filter(&self, operation: Operation) -> PathFilter {
        let filter = PathFilter::new(Self::rules(&self.exclusions.code, operation));
        if self.public_root.is_some() {
            filter.with_rules([self.public_label.as_str()])
        } else {
            filter.with_rules(
                Self::rules(&self.exclusions.public, operation)
                    .iter()
                    .map(|rule| format!("{}/{}", self.public_label, rule)),
            )
        }
    }

    /// The deployment roots with their labels and the filters for `operation`
    pub fn roots(&self, operation: Operation) -> Vec<DeploymentRoot> {
        let mut roots = vec![DeploymentRoot {
            label: CODE_LABEL.to_string(),
            path: self.code_root.clone(),
            filter: self.code_filter(operation),
        }];
        if let Some(public_root) = &self.public_root {
            roots.push(DeploymentRoot {
                label: self.public_label.clone(),
                path: public_root.clone(),
                filter: self.public_filter(operation),
            });
        }
        roots
    }

    /// Archive sources for `operation`, skipping a public root that does not
    /// exist yet
    pub fn archive_sources(&self, operation: Operation) -> Vec<ArchiveSource> {
        self.roots(operation)
            .into_iter()
            .filter(|root| root.label == CODE_LABEL || root.path.is_dir())
            .map(|root| ArchiveSource::new(root.path, root.label, root.filter))
            .collect()
    }

    /// Where the public payload sits relative to a located payload root:
    /// a sibling `<label>/` when the package is split, otherwise nested.
    pub fn public_payload(&self, extracted: &Path, payload_root: &Path) -> Option<PathBuf> {
        let sibling = payload_root
            .parent()
            .filter(|parent| parent.starts_with(extracted))
            .map(|parent| parent.join(&self.public_label))
            .filter(|dir| dir.is_dir() && dir != payload_root);
        sibling.or_else(|| {
            let nested = payload_root.join(&self.public_label);
            nested.is_dir().then_some(nested)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn context(public_root: Option<&str>) -> UpdateContext {
        let mut config = HostpackConfig::default();
        config.state_dir = Some(PathBuf::from("/var/lib/hostpack"));
        config.layout.code_root = PathBuf::from("/srv/app");
        config.layout.public_root = public_root.map(PathBuf::from);
        UpdateContext::from_config(&config).unwrap()
    }

    #[test]
    fn test_paths_resolve_from_state_dir() {
        let ctx = context(None);
        assert_eq!(ctx.backup_dir, PathBuf::from("/var/lib/hostpack/backups"));
        assert_eq!(ctx.lock_path, PathBuf::from("/var/lib/hostpack/update.lock"));
        assert_eq!(ctx.manifest_path(), PathBuf::from("/srv/app/app.manifest.json"));
    }

    #[test]
    fn test_split_layout_excludes_nested_public_from_code() {
        let nested = context(None);
        assert!(!nested.code_filter(Operation::Merge).is_excluded("public/index.php"));
        assert!(nested.code_filter(Operation::Merge).is_excluded("public/hot"));
        assert!(nested.code_filter(Operation::Package).is_excluded("public/hot"));
        assert!(nested.code_filter(Operation::Backup).is_excluded("public/storage/img.png"));
        assert_eq!(nested.roots(Operation::Merge).len(), 1);

        let split = context(Some("/srv/public_html"));
        assert!(split.code_filter(Operation::Merge).is_excluded("public/index.php"));
        assert!(split.code_filter(Operation::Merge).is_excluded(".env"));
        assert_eq!(split.roots(Operation::Merge)[1].label, "public");
    }

    #[test]
    fn test_backup_never_skips_what_merge_writes() {
        let mut ctx = context(Some("/srv/public_html"));
        ctx.exclusions.code.backup.push("vendor".to_string());
        ctx.exclusions.public.backup.push("build".to_string());

        let code = ctx.code_filter(Operation::Backup);
        assert!(!code.is_excluded("vendor/lib.php"));
        assert!(code.is_excluded(".env"));
        assert!(code.is_excluded("storage/app/data.db"));
        assert!(!ctx.public_filter(Operation::Backup).is_excluded("build/app.js"));

        // Merge keeps the configured set untouched
        assert!(!ctx.code_filter(Operation::Merge).is_excluded("vendor/lib.php"));
    }

    #[test]
    fn test_public_payload_sibling_then_nested() {
        let ctx = context(Some("/srv/public_html"));
        let temp = TempDir::new().unwrap();
        let extracted = temp.path();

        fs::create_dir_all(extracted.join("app/public")).unwrap();
        assert_eq!(
            ctx.public_payload(extracted, &extracted.join("app")),
            Some(extracted.join("app/public"))
        );

        fs::create_dir_all(extracted.join("public")).unwrap();
        assert_eq!(
            ctx.public_payload(extracted, &extracted.join("app")),
            Some(extracted.join("public"))
        );

        // A payload at the extraction root has no sibling inside it
        assert_eq!(
            ctx.public_payload(extracted, extracted),
            Some(extracted.join("public"))
        );
    }
}
