//! Deployment trees, update contexts and package archives

use hostpack_archive::{ArchiveSource, ArchiveWriter, PathFilter};
use hostpack_core::HostpackConfig;
use hostpack_update::UpdateContext;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::builders::TEST_REPO;

/// Manifest content declaring `version`
pub fn manifest(version: &str) -> String {
    format!(r#"{{"name":"billing","version":"{}"}}"#, version)
}

/// Live files of a deployment running 1.0.0, besides its manifest
pub const SITE_FILES: &[(&str, &str)] = &[
    ("index.php", "<?php // v1"),
    ("src/Invoices/InvoiceService.php", "<?php class InvoiceService {} // v1"),
    ("resources/views/layout.html", "<html>v1</html>"),
    (".env", "APP_KEY=live-secret"),
    ("storage/logs/app.log", "live log"),
    ("storage/cache/data/blob", "cached"),
];

/// Files of the 2.0.0 payload, besides its manifest
pub const PAYLOAD_FILES: &[(&str, &str)] = &[
    ("index.php", "<?php // v2"),
    ("src/Invoices/InvoiceService.php", "<?php class InvoiceService {} // v2"),
    ("src/Orders/OrderService.php", "<?php class OrderService {}"),
    ("resources/views/layout.html", "<html>v2</html>"),
    (".env", "APP_KEY=packaged"),
];

/// Write `files` below `root`, creating parent directories
pub fn write_tree<P: AsRef<str>, C: AsRef<[u8]>>(root: &Path, files: &[(P, C)]) {
    for (path, content) in files {
        let full = root.join(path.as_ref());
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content.as_ref()).unwrap();
    }
}

/// Relative path -> contents for everything below `root`
/// (directories map to `None`); empty when `root` does not exist
pub fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    let mut map = BTreeMap::new();
    if root.is_dir() {
        collect(root, root, &mut map);
    }
    map
}

fn collect(root: &Path, dir: &Path, map: &mut BTreeMap<String, Option<Vec<u8>>>) {
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        if entry.file_type().unwrap().is_dir() {
            map.insert(relative, None);
            collect(root, &path, map);
        } else {
            map.insert(relative, Some(fs::read(&path).unwrap()));
        }
    }
}

/// A live deployment in a temporary directory
pub struct Deployment {
    pub temp: TempDir,
    pub site: PathBuf,
    pub public: Option<PathBuf>,
    pub state: PathBuf,
}

impl Deployment {
    /// A single-root deployment running 1.0.0
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("site");
        let state = temp.path().join("state");
        write_tree(&site, SITE_FILES);
        fs::write(site.join("app.manifest.json"), manifest("1.0.0")).unwrap();
        Self {
            temp,
            site,
            public: None,
            state,
        }
    }

    /// A deployment with a separate public root
    pub fn split() -> Self {
        let mut deployment = Self::new();
        let public = deployment.temp.path().join("public_html");
        write_tree(
            &public,
            &[("index.html", "<html>public v1</html>"), ("hot", "dev-server")],
        );
        deployment.public = Some(public);
        deployment
    }

    /// Context pointing at the release feed served at `api_url`
    pub fn context(&self, api_url: &str) -> UpdateContext {
        let mut config = HostpackConfig::default();
        config.state_dir = Some(self.state.clone());
        config.release.api_url = api_url.to_string();
        config.release.repo = TEST_REPO.to_string();
        config.layout.code_root = self.site.clone();
        config.layout.public_root = self.public.clone();
        UpdateContext::from_config(&config).unwrap()
    }

    /// Snapshot of every deployment root
    pub fn snapshot(&self) -> BTreeMap<String, Option<Vec<u8>>> {
        let mut map = snapshot(&self.site);
        if let Some(public) = &self.public {
            for (path, content) in snapshot(public) {
                map.insert(format!("<public>/{}", path), content);
            }
        }
        map
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.site.join(relative)).unwrap()
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.state.join("backups")
    }

    /// Backup archives on disk
    pub fn backups(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.backup_dir()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a zip package from `(label, files)` sources and return its bytes
pub fn build_package(sources: &[(&str, Vec<(String, String)>)]) -> Vec<u8> {
    let temp = TempDir::new().unwrap();
    let archive_sources: Vec<ArchiveSource> = sources
        .iter()
        .enumerate()
        .map(|(i, (label, files))| {
            let root = temp.path().join(format!("src-{}", i));
            fs::create_dir_all(&root).unwrap();
            write_tree(&root, files.as_slice());
            ArchiveSource::new(root, *label, PathFilter::identity())
        })
        .collect();

    let dest = temp.path().join("package.zip");
    ArchiveWriter::new().build(&dest, &archive_sources).unwrap();
    fs::read(dest).unwrap()
}

/// Payload files for `version`, including its manifest
pub fn payload(version: &str) -> Vec<(String, String)> {
    let mut files: Vec<(String, String)> = PAYLOAD_FILES
        .iter()
        .map(|(p, c)| (p.to_string(), c.to_string()))
        .collect();
    files.push(("app.manifest.json".to_string(), manifest(version)));
    files
}

/// A package with the payload wrapped in one extra directory, the way
/// release source archives are
pub fn wrapped_package(version: &str) -> Vec<u8> {
    let wrapper = format!("billing-{}", version);
    build_package(&[(wrapper.as_str(), payload(version))])
}

pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
