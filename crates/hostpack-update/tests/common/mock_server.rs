//! Wiremock helpers for the release feed and package downloads

use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::builders::TEST_REPO;

fn latest_path() -> String {
    format!("/repos/{}/releases/latest", TEST_REPO)
}

/// Serve `release` as the latest release
pub async fn mock_latest_release(server: &MockServer, release: Value) {
    Mock::given(method("GET"))
        .and(path(latest_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(release))
        .mount(server)
        .await;
}

/// Answer the latest-release request with `status`
pub async fn mock_latest_release_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(latest_path()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve `release` only after `delay`
pub async fn mock_slow_latest_release(server: &MockServer, release: Value, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(latest_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(release)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Serve `content` under `/download/<name>`
pub async fn mock_asset(server: &MockServer, name: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

/// Fail every request for `/download/<name>` with HTTP 500
pub async fn mock_failing_asset(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{}", name)))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

/// Publish a release whose package is `content`, served by the mock server
pub async fn mock_release_with_package(server: &MockServer, version: &str, content: &[u8]) {
    let name = super::builders::package_name(version);
    let release = super::builders::ReleaseBuilder::new()
        .version(version)
        .served_asset(&server.uri(), &name)
        .build();
    mock_latest_release(server, release).await;
    mock_asset(server, &name, content).await;
}

/// Serve `content` under `/download/<name>` only after `delay`
pub async fn mock_slow_asset(server: &MockServer, name: &str, content: &[u8], delay: Duration) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{}", name)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .set_delay(delay),
        )
        .mount(server)
        .await;
}
