//! Shared tree fixtures for hostpack-archive integration tests
//!
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Files of a small deployment, including paths the default rules exclude
pub const DEPLOYMENT_FILES: &[(&str, &str)] = &[
    ("app.manifest.json", r#"{"name":"billing","version":"1.4.0"}"#),
    ("index.php", "<?php require 'bootstrap/app.php';"),
    ("bootstrap/app.php", "<?php return new App();"),
    ("src/Invoices/InvoiceService.php", "<?php class InvoiceService {}"),
    ("src/Orders/OrderService.php", "<?php class OrderService {}"),
    ("resources/views/layout.html", "<html></html>"),
    (".env", "APP_KEY=secret"),
    ("storage/logs/app.log", "log line"),
    ("node_modules/left-pad/index.js", "module.exports = 1;"),
    (".git/HEAD", "ref: refs/heads/main"),
];

/// Write `files` below `root`, creating parent directories
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
}

/// Relative path -> contents for every regular file below `root`
/// (directories map to `None`)
pub fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    let mut map = BTreeMap::new();
    collect(root, root, &mut map);
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
        let file_type = entry.file_type().unwrap();
        if file_type.is_dir() {
            map.insert(relative, None);
            collect(root, &path, map);
        } else {
            map.insert(relative, Some(fs::read(&path).unwrap()));
        }
    }
}
