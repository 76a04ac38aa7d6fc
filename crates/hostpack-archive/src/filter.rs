//! Exclusion rules over normalized relative paths.
//!
//! A path is excluded when it equals a rule or lies underneath one
//! (`rule + "/"` prefix). Matching is exact-string and case-sensitive;
//! there are no globs. Because a rule covers its whole subtree, walkers
//! check the filter before descending and never open excluded directories.

use std::path::{Component, Path};

/// Normalize a relative path for matching.
///
/// Backslashes become forward slashes, empty and `.` segments are dropped,
/// so `.\vendor\\lib/` and `vendor/lib` normalize identically.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Compute the forward-slash relative path of `path` below `root`.
///
/// Returns `None` when `path` is not below `root` or when the remainder
/// contains anything other than plain names (`..`, roots, prefixes) or
/// non UTF-8 segments.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in rest.components() {
        match component {
            Component::Normal(name) => segments.push(name.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

/// Ordered set of exclusion rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    rules: Vec<String>,
}

impl PathFilter {
    /// Create a filter from rules. Rules are normalized; rules that
    /// normalize to nothing (`""`, `"."`, `"/"`) are dropped rather than
    /// excluding the whole tree.
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::identity().with_rules(rules)
    }

    /// A filter that excludes nothing.
    pub fn identity() -> Self {
        Self { rules: Vec::new() }
    }

    /// Extend the filter with additional rules.
    pub fn with_rules<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for rule in rules {
            let rule = normalize(rule.as_ref());
            if !rule.is_empty() && !self.rules.contains(&rule) {
                self.rules.push(rule);
            }
        }
        self
    }

    /// The normalized rules, in insertion order.
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Keep only the rules `other` also excludes.
    ///
    /// A path excluded by the result is excluded by `other` as well, so the
    /// narrowed filter never skips anything `other` would let through.
    pub fn narrowed_to(&self, other: &PathFilter) -> PathFilter {
        PathFilter {
            rules: self
                .rules
                .iter()
                .filter(|rule| other.matches_normalized(rule))
                .cloned()
                .collect(),
        }
    }

    /// Whether the filter has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check a relative path (either separator style) against the rules.
    pub fn is_excluded(&self, relative: &str) -> bool {
        let path = normalize(relative);
        self.matches_normalized(&path)
    }

    /// Check a relative `Path` against the rules.
    pub fn is_excluded_path(&self, relative: &Path) -> bool {
        self.is_excluded(&relative.to_string_lossy())
    }

    /// Check an already-normalized path, skipping normalization.
    pub(crate) fn matches_normalized(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| {
            path == rule
                || (path.len() > rule.len()
                    && path.starts_with(rule.as_str())
                    && path.as_bytes()[rule.len()] == b'/')
        })
    }
}
