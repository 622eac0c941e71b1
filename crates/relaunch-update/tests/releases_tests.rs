//! Latest-release lookup against a mock release API

mod common;

use common::*;
use relaunch_core::types::NetworkConfig;
use relaunch_update::releases::ReleaseMetadataClient;
use relaunch_update::version::VersionTag;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> ReleaseMetadataClient {
    ReleaseMetadataClient::new(&NetworkConfig::default()).unwrap()
}

#[tokio::test]
async fn test_fetch_latest_parses_tag_and_assets() {
    let server = MockServer::start().await;
    let release = ReleaseJsonBuilder::new()
        .tag(TAG_V1_1_0)
        .asset(&server.uri(), LAUNCHER_ASSET, 2048)
        .asset(&server.uri(), "launcher.zip.sha256", 64)
        .build();
    mock_latest_release(&server, LAUNCHER_RELEASE_PATH, release).await;

    let descriptor = client()
        .fetch_latest(&url(&server, LAUNCHER_RELEASE_PATH), None)
        .await;

    assert_eq!(descriptor.tag, VersionTag::parse(VERSION_1_1_0));
    assert_eq!(descriptor.assets.len(), 2);

    let asset = descriptor.select_asset(LAUNCHER_ASSET).unwrap();
    assert_eq!(asset.size, Some(2048));
    assert_eq!(asset.download_url, format!("{}/download/{}", server.uri(), LAUNCHER_ASSET));
    assert_eq!(
        descriptor.checksum_url_for(LAUNCHER_ASSET),
        Some(format!("{}/download/launcher.zip.sha256", server.uri()))
    );
}

#[tokio::test]
async fn test_fetch_latest_derives_api_url_from_asset_id() {
    let server = MockServer::start().await;
    let release = ReleaseJsonBuilder::new()
        .asset_without_api_url(&server.uri(), CLIENT_ASSET)
        .build();
    mock_latest_release(&server, CLIENT_RELEASE_PATH, release).await;

    let descriptor = client().fetch_latest(&url(&server, CLIENT_RELEASE_PATH), None).await;
    let asset = descriptor.select_asset(CLIENT_ASSET).unwrap();

    assert_eq!(
        asset.api_url.as_deref(),
        Some(format!("{}/repos/acme/client/releases/assets/1", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_fetch_latest_server_error_is_neutral() {
    let server = MockServer::start().await;
    mock_status(&server, LAUNCHER_RELEASE_PATH, 500).await;

    let descriptor = client()
        .fetch_latest(&url(&server, LAUNCHER_RELEASE_PATH), None)
        .await;

    assert!(descriptor.is_empty());
    assert!(descriptor.tag.is_empty());
    assert!(descriptor.assets.is_empty());
}

#[tokio::test]
async fn test_fetch_latest_malformed_body_is_neutral() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LAUNCHER_RELEASE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let descriptor = client()
        .fetch_latest(&url(&server, LAUNCHER_RELEASE_PATH), None)
        .await;

    assert!(descriptor.is_empty());
}

#[tokio::test]
async fn test_fetch_latest_unreachable_is_neutral() {
    let descriptor = client()
        .fetch_latest("http://127.0.0.1:1/repos/acme/launcher/releases/latest", None)
        .await;

    assert!(descriptor.is_empty());
}

#[tokio::test]
async fn test_fetch_latest_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LAUNCHER_RELEASE_PATH))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(ReleaseJsonBuilder::new().build()))
        .expect(1)
        .mount(&server)
        .await;

    let descriptor = client()
        .fetch_latest(&url(&server, LAUNCHER_RELEASE_PATH), Some(TEST_TOKEN))
        .await;

    assert_eq!(descriptor.tag, VersionTag::parse(TAG_V1_0_0));
}

#[tokio::test]
async fn test_fetch_launcher_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config/launcher_config.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"clientFolder": "game", "clientMinVersion": "2.0.0"}"#,
        ))
        .mount(&server)
        .await;

    let config = client()
        .fetch_launcher_config(&url(&server, "/config/launcher_config.json"), None)
        .await
        .unwrap();

    assert_eq!(config.client_folder.as_deref(), Some("game"));
    assert_eq!(config.client_min_version.as_deref(), Some("2.0.0"));
}

#[tokio::test]
async fn test_fetch_launcher_config_failure_is_none() {
    let server = MockServer::start().await;
    mock_status(&server, "/config/launcher_config.json", 404).await;

    let config = client()
        .fetch_launcher_config(&url(&server, "/config/launcher_config.json"), None)
        .await;

    assert!(config.is_none());
}
