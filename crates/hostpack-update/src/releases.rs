//! Release feed access and package asset resolution

use crate::error::{Result, UpdateError};
use crate::version::parse_version;
use hostpack_core::types::{NetworkConfig, ReleaseConfig};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Suffix of checksum sidecar assets
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// Release as returned by the releases API
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Release tag (e.g., "v2.0.0")
    pub tag_name: String,

    /// Release notes
    pub body: Option<String>,

    /// Published date
    pub published_at: Option<String>,

    /// Release assets
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,

    /// Source archive of the tagged tree
    pub zipball_url: Option<String>,
}

/// Release asset
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// Asset name
    pub name: String,

    /// Download URL
    pub browser_download_url: String,

    /// Asset size in bytes
    #[serde(default)]
    pub size: u64,
}

/// A resolved, installable release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseDescriptor {
    pub version: Version,
    pub tag: String,
    /// File name the package is saved under; its extension selects the
    /// archive format
    pub asset_name: String,
    pub asset_url: String,
    pub checksum_url: Option<String>,
    pub published_at: Option<String>,
    pub notes: Option<String>,
}

impl ReleaseDescriptor {
    /// Describe a package given directly by URL.
    ///
    /// The file name is taken from the URL's last path segment; when it has
    /// no recognized archive extension, `default_extension` is appended.
    pub fn from_url(url: &str, version: &str, default_extension: &str) -> Result<Self> {
        let version = parse_version(version)?;
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let segment = path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .filter(|s| !s.contains(':'))
            .unwrap_or("package");

        let asset_name = if has_archive_extension(segment) {
            segment.to_string()
        } else {
            format!("{}{}", segment, default_extension)
        };

        Ok(Self {
            tag: format!("v{}", version),
            version,
            asset_name,
            asset_url: url.to_string(),
            checksum_url: None,
            published_at: None,
            notes: None,
        })
    }
}

fn has_archive_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".zip") || lower.ends_with(".tar.gz") || lower.ends_with(".tgz")
}

/// Pick the deployable package among release assets: the first whose name
/// contains `marker` and ends with `extension`.
pub fn select_asset<'a>(
    assets: &'a [ReleaseAsset],
    marker: &str,
    extension: &str,
) -> Option<&'a ReleaseAsset> {
    assets
        .iter()
        .find(|a| a.name.contains(marker) && a.name.ends_with(extension))
}

/// Map a reqwest failure to the taxonomy, keeping timeouts distinct
pub(crate) fn map_request_error(err: reqwest::Error, url: &str, timeout: Duration) -> UpdateError {
    if err.is_timeout() {
        UpdateError::Timeout {
            url: url.to_string(),
            seconds: timeout.as_secs(),
        }
    } else {
        UpdateError::network(format!("{}: {}", url, err))
    }
}

/// Client for the releases API
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    client: reqwest::Client,
    api_url: String,
    repo: String,
    marker: String,
    extension: String,
    timeout: Duration,
}

impl ReleaseClient {
    /// Create a client from the release and network settings
    pub fn new(release: &ReleaseConfig, network: &NetworkConfig) -> Result<Self> {
        if release.repo.trim().is_empty() {
            return Err(hostpack_core::Error::invalid_config("release.repo is not set").into());
        }

        let client = reqwest::Client::builder()
            .user_agent(&network.user_agent)
            .build()
            .map_err(|e| UpdateError::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: release.api_url.trim_end_matches('/').to_string(),
            repo: release.repo.clone(),
            marker: release.package_marker.clone(),
            extension: release.archive_extension.clone(),
            timeout: Duration::from_secs(network.metadata_timeout_secs),
        })
    }

    /// Override the metadata timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the raw latest release
    pub async fn latest_release(&self) -> Result<Release> {
        let url = format!("{}/repos/{}/releases/latest", self.api_url, self.repo);
        debug!("Fetching latest release from: {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| map_request_error(e, &url, self.timeout))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpdateError::not_found(format!(
                "no published release for {}",
                self.repo
            )));
        }
        if !status.is_success() {
            return Err(UpdateError::network(format!(
                "failed to fetch release: HTTP {}",
                status
            )));
        }

        response
            .json::<Release>()
            .await
            .map_err(|e| match map_request_error(e, &url, self.timeout) {
                UpdateError::Network { message } => {
                    UpdateError::network(format!("invalid release metadata: {}", message))
                }
                other => other,
            })
    }

    /// Fetch and resolve the latest release
    pub async fn fetch_latest(&self) -> Result<ReleaseDescriptor> {
        let release = self.latest_release().await?;
        self.resolve(release)
    }

    /// Turn a release into a descriptor, choosing the package asset or
    /// falling back to the source zipball.
    pub fn resolve(&self, release: Release) -> Result<ReleaseDescriptor> {
        let version = parse_version(&release.tag_name)?;

        let (asset_name, asset_url, checksum_url) =
            match select_asset(&release.assets, &self.marker, &self.extension) {
                Some(asset) => {
                    let sidecar = format!("{}{}", asset.name, CHECKSUM_SUFFIX);
                    let checksum_url = release
                        .assets
                        .iter()
                        .find(|a| a.name == sidecar)
                        .map(|a| a.browser_download_url.clone());
                    (
                        asset.name.clone(),
                        asset.browser_download_url.clone(),
                        checksum_url,
                    )
                }
                None => {
                    let zipball = release.zipball_url.clone().ok_or_else(|| {
                        UpdateError::not_found(format!(
                            "release {} has no '{}' asset and no source archive",
                            release.tag_name, self.marker
                        ))
                    })?;
                    debug!("No package asset in {}, using source archive", release.tag_name);
                    let repo_name = self.repo.rsplit('/').next().unwrap_or(&self.repo);
                    (
                        format!("{}-{}.zip", repo_name, release.tag_name),
                        zipball,
                        None,
                    )
                }
            };

        info!("Latest release: {} ({})", version, asset_name);

        Ok(ReleaseDescriptor {
            version,
            tag: release.tag_name,
            asset_name,
            asset_url,
            checksum_url,
            published_at: release.published_at,
            notes: release.body,
        })
    }
}
