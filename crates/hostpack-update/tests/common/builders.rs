//! Builder for release feed responses

use serde_json::{json, Value};

/// Repository used by every test context
pub const TEST_REPO: &str = "acme/billing";

/// Package asset name for a version
pub fn package_name(version: &str) -> String {
    format!("app-package-v{}.zip", version)
}

/// Builder for the JSON body of `/repos/{repo}/releases/latest`
#[derive(Debug, Clone)]
pub struct ReleaseBuilder {
    tag_name: String,
    body: Option<String>,
    published_at: Option<String>,
    assets: Vec<Value>,
    zipball_url: Option<String>,
}

impl ReleaseBuilder {
    pub fn new() -> Self {
        Self {
            tag_name: "v2.0.0".to_string(),
            body: None,
            published_at: Some("2026-03-01T12:00:00Z".to_string()),
            assets: Vec::new(),
            zipball_url: None,
        }
    }

    /// Set the version (adds the `v` prefix)
    pub fn version(mut self, version: &str) -> Self {
        self.tag_name = format!("v{}", version);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag_name = tag.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Add an asset downloadable from `url`
    pub fn asset(mut self, name: &str, url: &str) -> Self {
        self.assets.push(json!({
            "name": name,
            "browser_download_url": url,
            "size": 0,
        }));
        self
    }

    /// Add an asset served by the mock server under `/download/<name>`
    pub fn served_asset(self, server_uri: &str, name: &str) -> Self {
        let url = download_url(server_uri, name);
        self.asset(name, &url)
    }

    pub fn zipball(mut self, url: &str) -> Self {
        self.zipball_url = Some(url.to_string());
        self
    }

    pub fn build(self) -> Value {
        json!({
            "tag_name": self.tag_name,
            "body": self.body,
            "published_at": self.published_at,
            "assets": self.assets,
            "zipball_url": self.zipball_url,
        })
    }
}

impl Default for ReleaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// URL of an asset served by [`super::mock_asset`]
pub fn download_url(server_uri: &str, name: &str) -> String {
    format!("{}/download/{}", server_uri, name)
}
