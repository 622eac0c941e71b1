//! End-to-end update flows against a mock release host

mod common;

use common::*;
use relaunch_core::types::{ApplyStrategy, ArtifactKind, IntegrityMode, LauncherConfig, RuntimeConfig};
use relaunch_update::error::UpdateError;
use relaunch_update::flow::{resolve_launcher_config, UpdateFlow};
use relaunch_update::orchestrator::{ApplyOutcome, ApplyRequest, SelfReplaceOrchestrator};
use relaunch_update::releases::ReleaseMetadataClient;
use relaunch_update::store::{InstalledVersionRecord, JsonVersionStore, VersionStore};
use relaunch_update::version::VersionTag;
use std::fs;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_FILES: &[(&str, &[u8])] = &[
    ("bin/client", b"client binary v1"),
    ("data/readme.txt", b"welcome"),
];

const LAUNCHER_FILES: &[(&str, &[u8])] = &[
    ("launcher", b"launcher binary v1.1"),
    ("lib/runtime.so", b"runtime"),
];

async fn serve_release(server: &MockServer, release_path: &str, tag: &str, asset: &str, archive: &[u8]) {
    let release = ReleaseJsonBuilder::new()
        .tag(tag)
        .asset(&server.uri(), asset, archive.len() as u64)
        .asset(&server.uri(), &format!("{}.sha256", asset), 64)
        .build();
    mock_latest_release(server, release_path, release).await;
    mock_asset_download(server, asset, archive).await;
    mock_asset_download(
        server,
        &format!("{}.sha256", asset),
        format!("{}  {}\n", sha256_hex(archive), asset).as_bytes(),
    )
    .await;
}

fn flow(layout: &TestLayout, launcher_config: LauncherConfig) -> UpdateFlow {
    flow_with_config(layout, test_runtime_config(&layout.staging_root), launcher_config)
}

fn flow_with_config(layout: &TestLayout, config: RuntimeConfig, launcher_config: LauncherConfig) -> UpdateFlow {
    UpdateFlow::new(config, &layout.launcher_root, launcher_config)
        .unwrap()
        .with_token(None)
        .with_build_version(VersionTag::parse(VERSION_1_0_0))
}

#[tokio::test]
async fn test_fresh_client_install_then_up_to_date() {
    let server = MockServer::start().await;
    let archive = zip_bytes(CLIENT_FILES);
    serve_release(&server, CLIENT_RELEASE_PATH, TAG_V1_0_0, CLIENT_ASSET, &archive).await;

    let layout = TestLayout::new();
    let launcher_config = LauncherConfigBuilder::new()
        .client_endpoint(url(&server, CLIENT_RELEASE_PATH))
        .client_folder("client")
        .build();
    let listener = Arc::new(RecordingListener::new());
    let flow = flow(&layout, launcher_config).with_listener(listener.clone());

    let check = flow.check(ArtifactKind::Client).await.unwrap();
    assert!(check.needs_update());
    assert!(check.client_missing);
    assert_eq!(check.verdict.latest_tag, VersionTag::parse(VERSION_1_0_0));

    let prepared = flow.prepare(&check).await.unwrap();
    assert!(prepared.integrity.verified);
    assert_eq!(prepared.checksum, sha256_hex(&archive));
    let staging_root = prepared.staging.root().to_path_buf();

    let summary = flow.apply_client(prepared).await.unwrap();
    assert!(summary.is_clean());
    assert_eq!(summary.copied, 2);
    assert!(!staging_root.exists());

    let client_root = layout.launcher_root.join("client");
    assert_eq!(read(&client_root, "bin/client"), b"client binary v1");
    assert_eq!(read(&client_root, "data/readme.txt"), b"welcome");

    let record = flow.store().read(ArtifactKind::Client).unwrap().unwrap();
    assert_eq!(record.version_tag, VersionTag::parse(VERSION_1_0_0));
    assert_eq!(record.checksum_sha256, Some(sha256_hex(&archive)));

    let again = flow.check(ArtifactKind::Client).await.unwrap();
    assert!(!again.needs_update());
    assert!(!again.client_missing);
    assert_eq!(again.verdict.installed_tag, VersionTag::parse(VERSION_1_0_0));
}

#[tokio::test]
async fn test_client_below_minimum_is_mandatory() {
    let server = MockServer::start().await;
    serve_release(&server, CLIENT_RELEASE_PATH, TAG_V1_1_0, CLIENT_ASSET, &zip_bytes(CLIENT_FILES)).await;

    let layout = TestLayout::new();
    let client_root = layout.launcher_root.join("client");
    write_tree(&client_root, CLIENT_FILES);
    JsonVersionStore::for_client(&client_root)
        .write(ArtifactKind::Client, &InstalledVersionRecord::new(VersionTag::parse(VERSION_0_9)))
        .unwrap();

    let launcher_config = LauncherConfigBuilder::new()
        .client_endpoint(url(&server, CLIENT_RELEASE_PATH))
        .client_folder("client")
        .client_min_version(VERSION_1_0_0)
        .build();

    let check = flow(&layout, launcher_config).check(ArtifactKind::Client).await.unwrap();

    assert!(check.verdict.has_update);
    assert!(check.verdict.mandatory);
    assert_eq!(check.verdict.installed_tag, VersionTag::parse(VERSION_0_9));
}

#[tokio::test]
async fn test_unreachable_release_host_means_no_update() {
    let server = MockServer::start().await;
    mock_status(&server, CLIENT_RELEASE_PATH, 500).await;

    let layout = TestLayout::new();
    let client_root = layout.launcher_root.join("client");
    write_tree(&client_root, CLIENT_FILES);

    let launcher_config = LauncherConfigBuilder::new()
        .client_endpoint(url(&server, CLIENT_RELEASE_PATH))
        .client_folder("client")
        .build();

    let check = flow(&layout, launcher_config).check(ArtifactKind::Client).await.unwrap();

    assert!(!check.needs_update());
    assert!(check.verdict.latest_tag.is_empty());
}

#[tokio::test]
async fn test_launcher_check_without_endpoint_creates_record() {
    let layout = TestLayout::new();
    let flow = flow(&layout, LauncherConfig::default());

    let check = flow.check(ArtifactKind::Launcher).await.unwrap();

    assert!(!check.needs_update());
    let record = flow.store().read(ArtifactKind::Launcher).unwrap().unwrap();
    assert_eq!(record.version_tag, VersionTag::parse(VERSION_1_0_0));
}

#[tokio::test]
async fn test_launcher_check_prefers_declared_version_over_build() {
    let layout = TestLayout::new();
    let launcher_config = LauncherConfigBuilder::new().launcher_version(VERSION_0_9).build();
    let flow = flow(&layout, launcher_config);

    assert_eq!(flow.installed_tag(ArtifactKind::Launcher), VersionTag::parse(VERSION_0_9));
}

#[tokio::test]
async fn test_corrupt_download_is_rejected_before_install() {
    let server = MockServer::start().await;
    let archive = zip_bytes(CLIENT_FILES);
    let release = ReleaseJsonBuilder::new()
        .tag(TAG_V1_0_0)
        .asset(&server.uri(), CLIENT_ASSET, archive.len() as u64)
        .asset(&server.uri(), "client-to-update.zip.sha256", 64)
        .build();
    mock_latest_release(&server, CLIENT_RELEASE_PATH, release).await;
    mock_asset_download(&server, CLIENT_ASSET, &archive).await;
    mock_asset_download(&server, "client-to-update.zip.sha256", WRONG_CHECKSUM.as_bytes()).await;

    let layout = TestLayout::new();
    let launcher_config = LauncherConfigBuilder::new()
        .client_endpoint(url(&server, CLIENT_RELEASE_PATH))
        .client_folder("client")
        .build();
    let flow = flow(&layout, launcher_config);

    let check = flow.check(ArtifactKind::Client).await.unwrap();
    let err = flow.prepare(&check).await.unwrap_err();

    assert!(matches!(err, UpdateError::Integrity { .. }));
    let attempts = fs::read_dir(&layout.staging_root).map(|d| d.count()).unwrap_or(0);
    assert_eq!(attempts, 0);
    assert!(!layout.launcher_root.join("client/bin/client").exists());
    assert!(flow.store().read(ArtifactKind::Client).unwrap().is_none());
}

#[tokio::test]
async fn test_advisory_mode_installs_despite_mismatch() {
    let server = MockServer::start().await;
    let archive = zip_bytes(CLIENT_FILES);
    let release = ReleaseJsonBuilder::new()
        .tag(TAG_V1_0_0)
        .asset(&server.uri(), CLIENT_ASSET, archive.len() as u64)
        .asset(&server.uri(), "client-to-update.zip.sha256", 64)
        .build();
    mock_latest_release(&server, CLIENT_RELEASE_PATH, release).await;
    mock_asset_download(&server, CLIENT_ASSET, &archive).await;
    mock_asset_download(&server, "client-to-update.zip.sha256", WRONG_CHECKSUM.as_bytes()).await;

    let layout = TestLayout::new();
    let mut config = test_runtime_config(&layout.staging_root);
    config.update.integrity_mode = IntegrityMode::Advisory;
    let launcher_config = LauncherConfigBuilder::new()
        .client_endpoint(url(&server, CLIENT_RELEASE_PATH))
        .client_folder("client")
        .build();
    let flow = flow_with_config(&layout, config, launcher_config);

    let check = flow.check(ArtifactKind::Client).await.unwrap();
    let prepared = flow.prepare(&check).await.unwrap();
    assert!(!prepared.integrity.verified);

    flow.apply_client(prepared).await.unwrap();
    assert!(layout.launcher_root.join("client/bin/client").is_file());
}

#[tokio::test]
async fn test_launcher_update_hands_off_to_helper() {
    let server = MockServer::start().await;
    let archive = zip_bytes(LAUNCHER_FILES);
    serve_release(&server, LAUNCHER_RELEASE_PATH, TAG_V1_1_0, LAUNCHER_ASSET, &archive).await;

    let layout = TestLayout::new();
    write_tree(&layout.launcher_root, &[("launcher", b"launcher binary v1.0")]);
    fs::write(
        layout.launcher_root.join("launcher_config.json"),
        r#"{"launcherVersion": "1.0.0"}"#,
    )
    .unwrap();
    let running = layout.path().join("running-launcher");
    fs::write(&running, b"helper image").unwrap();

    let launcher_config = LauncherConfigBuilder::new()
        .launcher_endpoint(url(&server, LAUNCHER_RELEASE_PATH))
        .launcher_version(VERSION_1_0_0)
        .launcher_executable("launcher")
        .build();
    let flow = flow(&layout, launcher_config);

    let check = flow.check(ArtifactKind::Launcher).await.unwrap();
    assert!(check.needs_update());
    assert!(!check.verdict.mandatory);

    let prepared = flow.prepare(&check).await.unwrap();
    let handoff = flow.stage_launcher(&prepared, &running, 4100).unwrap();

    assert!(handoff.helper.is_file());
    assert_eq!(handoff.helper.parent(), Some(prepared.staging.root()));
    assert_eq!(handoff.extraction.copied, 2);
    assert_eq!(handoff.args[0], "apply");
    assert!(handoff.args.windows(2).any(|w| w[0] == "--pid" && w[1] == "4100"));
    assert!(handoff.args.windows(2).any(|w| w[0] == "--version-tag" && w[1] == VERSION_1_1_0));
    assert!(handoff.args.windows(2).any(|w| w[0] == "--exe" && w[1] == "launcher"));

    // what the helper does once started
    let process = Arc::new(FakeProcessControl::alive_for(2));
    let request = ApplyRequest::new(ArtifactKind::Launcher, prepared.staging.payload_dir(), &layout.launcher_root)
        .with_pid(Some(4100))
        .with_version_tag(Some(prepared.tag.clone()))
        .with_source_url(Some(prepared.source_url.clone()))
        .with_checksum(Some(prepared.checksum.clone()))
        .with_executable(Some("launcher".into()));
    let report = SelfReplaceOrchestrator::new(fast_settings(ApplyStrategy::ShadowSwap), flow.store().clone())
        .with_process_control(process)
        .run(&request)
        .await
        .unwrap();

    assert_eq!(report.outcome, ApplyOutcome::Relaunched { pid: 4242 });
    assert_eq!(read(&layout.launcher_root, "launcher"), b"launcher binary v1.1");
    assert_eq!(read(&layout.launcher_root, "lib/runtime.so"), b"runtime");
    assert!(!prepared.staging.root().exists());

    assert_eq!(flow.installed_tag(ArtifactKind::Launcher), VersionTag::parse(VERSION_1_1_0));
    let config = LauncherConfig::load_local(&layout.launcher_root).unwrap();
    assert_eq!(config.launcher_version.as_deref(), Some(VERSION_1_1_0));
}

#[tokio::test]
async fn test_prepare_without_asset_fails() {
    let server = MockServer::start().await;
    mock_latest_release(&server, CLIENT_RELEASE_PATH, ReleaseJsonBuilder::new().tag(TAG_V1_0_0).build()).await;

    let layout = TestLayout::new();
    let launcher_config = LauncherConfigBuilder::new()
        .client_endpoint(url(&server, CLIENT_RELEASE_PATH))
        .client_folder("client")
        .build();
    let flow = flow(&layout, launcher_config);

    let check = flow.check(ArtifactKind::Client).await.unwrap();
    let err = flow.prepare(&check).await.unwrap_err();

    assert!(matches!(err, UpdateError::NoAsset(_)));
}

#[tokio::test]
async fn test_remote_launcher_config_wins_over_local() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config/launcher_config.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"clientFolder": "remote-client"}"#))
        .mount(&server)
        .await;

    let layout = TestLayout::new();
    fs::write(
        layout.launcher_root.join("launcher_config.json"),
        format!(
            r#"{{"clientFolder": "local-client", "newConfigUrl": "{}"}}"#,
            url(&server, "/config/launcher_config.json")
        ),
    )
    .unwrap();

    let releases = ReleaseMetadataClient::new(&RuntimeConfig::default().network).unwrap();
    let config = resolve_launcher_config(&releases, &layout.launcher_root, None).await;

    assert_eq!(config.client_folder.as_deref(), Some("remote-client"));
}

#[tokio::test]
async fn test_local_launcher_config_used_when_remote_fails() {
    let server = MockServer::start().await;
    mock_status(&server, "/config/launcher_config.json", 503).await;

    let layout = TestLayout::new();
    fs::write(
        layout.launcher_root.join("launcher_config.json"),
        format!(
            r#"{{"clientFolder": "local-client", "newConfigUrl": "{}"}}"#,
            url(&server, "/config/launcher_config.json")
        ),
    )
    .unwrap();

    let releases = ReleaseMetadataClient::new(&RuntimeConfig::default().network).unwrap();
    let config = resolve_launcher_config(&releases, &layout.launcher_root, None).await;

    assert_eq!(config.client_folder.as_deref(), Some("local-client"));
}

#[tokio::test]
async fn test_missing_launcher_config_falls_back_to_defaults() {
    let layout = TestLayout::new();
    let releases = ReleaseMetadataClient::new(&RuntimeConfig::default().network).unwrap();

    let config = resolve_launcher_config(&releases, &layout.launcher_root, None).await;

    assert_eq!(config, LauncherConfig::default());
}
