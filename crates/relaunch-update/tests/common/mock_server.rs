//! Wiremock setup helpers

use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serve `release` as the latest release at `release_path`
pub async fn mock_latest_release(server: &MockServer, release_path: &str, release: Value) {
    Mock::given(method("GET"))
        .and(path(release_path.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(release))
        .mount(server)
        .await;
}

/// Serve `content` at `/download/{name}`
pub async fn mock_asset_download(server: &MockServer, name: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content))
        .mount(server)
        .await;
}

/// First `fail_count` requests for `/download/{name}` answer 500
pub async fn mock_flaky_download(server: &MockServer, name: &str, fail_count: u64, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{}", name)))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(fail_count)
        .mount(server)
        .await;

    mock_asset_download(server, name, content).await;
}

/// Every request to `route` answers `status`
pub async fn mock_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route.to_string()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve a checksum document at `/checksums/{name}`
pub async fn mock_checksum(server: &MockServer, name: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/checksums/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

pub fn url(server: &MockServer, route: &str) -> String {
    format!("{}{}", server.uri(), route)
}
