//! Package download with progress tracking and checksum verification
//!
//! Packages are streamed to a `.part` file in the work directory and hashed
//! as they arrive. When the release publishes a `<asset>.sha256` sidecar the
//! digest must match before the file is renamed to its final name.

use crate::error::{Result, UpdateError};
use crate::releases::{map_request_error, ReleaseDescriptor};
use futures_util::StreamExt;
use hostpack_archive::parse_checksum_line;
use hostpack_core::types::NetworkConfig;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::CONTENT_LENGTH;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Result of a download operation
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// Path to the downloaded package
    pub file_path: PathBuf,

    /// Size in bytes
    pub file_size: u64,

    /// SHA-256 of the package
    pub checksum: String,

    /// Whether the checksum was verified against a published sidecar
    pub verified: bool,
}

/// Streams release packages to disk
#[derive(Debug, Clone)]
pub struct PackageDownloader {
    client: reqwest::Client,
    download_timeout: Duration,
    metadata_timeout: Duration,
    show_progress: bool,
}

impl PackageDownloader {
    /// Create a downloader using the configured timeouts
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&network.user_agent)
            .build()
            .map_err(|e| UpdateError::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            download_timeout: Duration::from_secs(network.download_timeout_secs),
            metadata_timeout: Duration::from_secs(network.metadata_timeout_secs),
            show_progress: false,
        })
    }

    /// Enable or disable the progress bar
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Override the payload timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Download the descriptor's package into `dest_dir`.
    ///
    /// Nothing outside `dest_dir` is written; a failed download leaves at
    /// most a `.part` file there.
    pub async fn download(
        &self,
        descriptor: &ReleaseDescriptor,
        dest_dir: &Path,
    ) -> Result<DownloadResult> {
        let expected = match &descriptor.checksum_url {
            Some(url) => Some(self.fetch_expected_checksum(url).await?),
            None => None,
        };

        let file_name = Path::new(&descriptor.asset_name)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                UpdateError::download(format!("invalid asset name '{}'", descriptor.asset_name))
            })?;
        let file_path = dest_dir.join(&file_name);
        let mut part_name = file_name;
        part_name.push(".part");
        let part_path = dest_dir.join(part_name);

        info!("Downloading {} from {}", descriptor.asset_name, descriptor.asset_url);

        let url = descriptor.asset_url.as_str();
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| self.map_download_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::download(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        let total_size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let progress = self.progress_bar(total_size, &descriptor.asset_name);

        fs::create_dir_all(dest_dir).map_err(|e| {
            UpdateError::download(format!("cannot create {}: {}", dest_dir.display(), e))
        })?;
        let mut file = File::create(&part_path).map_err(|e| {
            UpdateError::download(format!("cannot create {}: {}", part_path.display(), e))
        })?;

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk: bytes::Bytes = chunk.map_err(|e| self.map_download_error(e, url))?;
            file.write_all(&chunk).map_err(|e| {
                UpdateError::download(format!("cannot write {}: {}", part_path.display(), e))
            })?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if let Some(pb) = &progress {
                pb.set_position(downloaded);
            }
        }

        file.sync_all()
            .map_err(|e| UpdateError::download(format!("cannot flush download: {}", e)))?;
        drop(file);

        if let Some(pb) = progress {
            pb.finish_with_message(format!("Downloaded {}", descriptor.asset_name));
        }

        if let Some(total) = total_size {
            if downloaded != total {
                return Err(UpdateError::download(format!(
                    "size mismatch: expected {} bytes, got {}",
                    total, downloaded
                )));
            }
        }

        let checksum = format!("{:x}", hasher.finalize());
        if let Some(expected) = &expected {
            if !checksum.eq_ignore_ascii_case(expected) {
                return Err(UpdateError::download(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    descriptor.asset_name, expected, checksum
                )));
            }
            debug!("Checksum verified: {}", checksum);
        }

        fs::rename(&part_path, &file_path).map_err(|e| {
            UpdateError::download(format!("cannot move download into place: {}", e))
        })?;

        Ok(DownloadResult {
            file_path,
            file_size: downloaded,
            checksum,
            verified: expected.is_some(),
        })
    }

    /// Fetch a `sha256sum`-style sidecar and return its digest
    async fn fetch_expected_checksum(&self, url: &str) -> Result<String> {
        debug!("Fetching checksum from {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.metadata_timeout)
            .send()
            .await
            .map_err(|e| map_request_error(e, url, self.metadata_timeout))?;

        if !response.status().is_success() {
            return Err(UpdateError::download(format!(
                "checksum {} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| map_request_error(e, url, self.metadata_timeout))?;
        parse_checksum_line(&body)
            .ok_or_else(|| UpdateError::download(format!("malformed checksum file at {}", url)))
    }

    fn map_download_error(&self, err: reqwest::Error, url: &str) -> UpdateError {
        match map_request_error(err, url, self.download_timeout) {
            UpdateError::Network { message } => UpdateError::download(message),
            other => other,
        }
    }

    fn progress_bar(&self, total: Option<u64>, name: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = match total {
            Some(total) => {
                let pb = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        };
        pb.set_message(format!("Downloading {}", name));
        Some(pb)
    }
}
