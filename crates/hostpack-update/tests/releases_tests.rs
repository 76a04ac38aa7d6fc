//! Release feed tests against a mock releases API
//!
//! Tests cover:
//! - Package asset selection and checksum sidecars
//! - Source archive fallback
//! - HTTP failures mapped to the error taxonomy
//! - Metadata timeouts

mod common;

use common::*;
use hostpack_core::types::{NetworkConfig, ReleaseConfig};
use hostpack_update::{ReleaseClient, UpdateError};
use semver::Version;
use std::time::Duration;
use wiremock::MockServer;

fn client(server: &MockServer) -> ReleaseClient {
    let release = ReleaseConfig {
        api_url: server.uri(),
        repo: TEST_REPO.to_string(),
        ..Default::default()
    };
    ReleaseClient::new(&release, &NetworkConfig::default()).unwrap()
}

#[tokio::test]
async fn test_selects_package_asset_over_other_assets() {
    let server = MockServer::start().await;
    let release = ReleaseBuilder::new()
        .version("2.0.0")
        .body("Invoice numbering fixes")
        .asset("readme.txt", "https://example.com/readme.txt")
        .asset("app-package-v2.zip", "https://example.com/app-package-v2.zip")
        .build();
    mock_latest_release(&server, release).await;

    let descriptor = client(&server).fetch_latest().await.unwrap();

    assert_eq!(descriptor.asset_name, "app-package-v2.zip");
    assert_eq!(descriptor.asset_url, "https://example.com/app-package-v2.zip");
    assert_eq!(descriptor.version, Version::new(2, 0, 0));
    assert_eq!(descriptor.tag, "v2.0.0");
    assert_eq!(descriptor.notes.as_deref(), Some("Invoice numbering fixes"));
    assert!(descriptor.checksum_url.is_none());
}

#[tokio::test]
async fn test_checksum_sidecar_is_attached() {
    let server = MockServer::start().await;
    let release = ReleaseBuilder::new()
        .asset("app-package-v2.zip", "https://example.com/p.zip")
        .asset("app-package-v2.zip.sha256", "https://example.com/p.zip.sha256")
        .build();
    mock_latest_release(&server, release).await;

    let descriptor = client(&server).fetch_latest().await.unwrap();
    assert_eq!(
        descriptor.checksum_url.as_deref(),
        Some("https://example.com/p.zip.sha256")
    );
}

#[tokio::test]
async fn test_falls_back_to_source_archive() {
    let server = MockServer::start().await;
    let release = ReleaseBuilder::new()
        .version("2.1.0")
        .asset("readme.txt", "https://example.com/readme.txt")
        .zipball("https://api.example.com/repos/acme/billing/zipball/v2.1.0")
        .build();
    mock_latest_release(&server, release).await;

    let descriptor = client(&server).fetch_latest().await.unwrap();

    assert_eq!(descriptor.asset_name, "billing-v2.1.0.zip");
    assert_eq!(
        descriptor.asset_url,
        "https://api.example.com/repos/acme/billing/zipball/v2.1.0"
    );
}

#[tokio::test]
async fn test_missing_release_is_not_found() {
    let server = MockServer::start().await;
    mock_latest_release_status(&server, 404).await;

    let err = client(&server).fetch_latest().await.unwrap_err();
    assert!(matches!(err, UpdateError::NotFound { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_retryable_network_error() {
    let server = MockServer::start().await;
    mock_latest_release_status(&server, 502).await;

    let err = client(&server).fetch_latest().await.unwrap_err();
    assert!(matches!(err, UpdateError::Network { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_metadata_is_network_error() {
    let server = MockServer::start().await;
    mock_latest_release(&server, serde_json::json!({ "unexpected": true })).await;

    let err = client(&server).fetch_latest().await.unwrap_err();
    match err {
        UpdateError::Network { message } => assert!(message.contains("invalid release metadata")),
        other => panic!("expected Network error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_feed_times_out() {
    let server = MockServer::start().await;
    mock_slow_latest_release(
        &server,
        ReleaseBuilder::new().build(),
        Duration::from_secs(5),
    )
    .await;

    let err = client(&server)
        .with_timeout(Duration::from_millis(300))
        .fetch_latest()
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::Timeout { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_invalid_tag_is_rejected() {
    let server = MockServer::start().await;
    let release = ReleaseBuilder::new()
        .tag("nightly")
        .asset("app-package-nightly.zip", "https://example.com/n.zip")
        .build();
    mock_latest_release(&server, release).await;

    let err = client(&server).fetch_latest().await.unwrap_err();
    assert!(matches!(err, UpdateError::InvalidVersion { .. }));
}
