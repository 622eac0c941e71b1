//! End-to-end update flows
//!
//! Ties the stages together the way the launcher uses them:
//!
//! - **check**: resolve the installed tag, fetch the latest release, decide.
//! - **prepare**: download into a fresh staging area and verify.
//! - **client**: extract straight into the client folder under the install
//!   lock; the record advances only if every entry was written.
//! - **launcher**: extract into the staging payload, copy the running
//!   executable beside it as the helper, and hand over to the helper's
//!   `apply` command after this process exits.

use relaunch_core::types::{ArtifactKind, ArtifactSource, LauncherConfig, RuntimeConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::decision::{evaluate_with, AssetPreference, UpdatePolicy, UpdateVerdict};
use crate::download::ArtifactDownloader;
use crate::error::{Result, UpdateError};
use crate::extract::{ArchiveExtractor, ExtractionSummary};
use crate::integrity::{compute_sha256, IntegrityReport, IntegrityVerifier};
use crate::lock::InstallLock;
use crate::process::ProcessControl;
use crate::progress::{NoopListener, UpdateListener};
use crate::releases::{ReleaseDescriptor, ReleaseMetadataClient};
use crate::staging::StagingArea;
use crate::store::{ensure_record, InstalledVersionRecord, JsonVersionStore, VersionStore};
use crate::version::VersionTag;

/// Result of checking one artifact
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCheck {
    pub artifact: ArtifactKind,
    pub verdict: UpdateVerdict,
    /// The client folder is missing or empty
    pub client_missing: bool,
}

impl UpdateCheck {
    /// A check that points straight at a download, bypassing release lookup
    pub fn direct(
        artifact: ArtifactKind,
        url: impl Into<String>,
        tag: VersionTag,
        api_url: Option<String>,
        checksum_url: Option<String>,
    ) -> Self {
        Self {
            artifact,
            verdict: UpdateVerdict {
                has_update: true,
                latest_tag: tag,
                asset_url: Some(url.into()),
                asset_api_url: api_url,
                checksum_url,
                ..UpdateVerdict::default()
            },
            client_missing: false,
        }
    }

    pub fn needs_update(&self) -> bool {
        self.verdict.has_update || self.client_missing
    }
}

/// A downloaded and verified archive
#[derive(Debug)]
pub struct PreparedUpdate {
    pub artifact: ArtifactKind,
    pub staging: StagingArea,
    pub archive: PathBuf,
    pub tag: VersionTag,
    pub source_url: String,
    pub checksum: String,
    pub integrity: IntegrityReport,
    pub bytes: u64,
}

/// How to start the helper that finishes a launcher update
#[derive(Debug, Clone, PartialEq)]
pub struct Handoff {
    pub helper: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub extraction: ExtractionSummary,
}

pub struct UpdateFlow {
    config: RuntimeConfig,
    launcher_root: PathBuf,
    launcher_config: LauncherConfig,
    releases: ReleaseMetadataClient,
    downloader: ArtifactDownloader,
    verifier: IntegrityVerifier,
    store: Arc<dyn VersionStore>,
    listener: Arc<dyn UpdateListener>,
    token: Option<String>,
    build_version: VersionTag,
}

impl UpdateFlow {
    pub fn new(config: RuntimeConfig, launcher_root: impl Into<PathBuf>, launcher_config: LauncherConfig) -> Result<Self> {
        let launcher_root = launcher_root.into();
        let store = JsonVersionStore::for_layout(&launcher_root, &launcher_config.client_root(&launcher_root));

        Ok(Self {
            releases: ReleaseMetadataClient::new(&config.network)?,
            downloader: ArtifactDownloader::new(&config)?,
            verifier: IntegrityVerifier::new(&config)?,
            token: config.auth.resolve_token(),
            store: Arc::new(store),
            listener: Arc::new(NoopListener),
            build_version: VersionTag::parse(env!("CARGO_PKG_VERSION")),
            config,
            launcher_root,
            launcher_config,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn VersionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn UpdateListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Version reported by this build, the last fallback for the launcher
    pub fn with_build_version(mut self, version: VersionTag) -> Self {
        self.build_version = version;
        self
    }

    pub fn with_downloader(mut self, downloader: ArtifactDownloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn launcher_root(&self) -> &Path {
        &self.launcher_root
    }

    pub fn launcher_config(&self) -> &LauncherConfig {
        &self.launcher_config
    }

    pub fn client_root(&self) -> PathBuf {
        self.launcher_config.client_root(&self.launcher_root)
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    /// Installed tag: record, then configuration, then (launcher only) build
    pub fn installed_tag(&self, artifact: ArtifactKind) -> VersionTag {
        match self.store.read(artifact) {
            Ok(Some(record)) if !record.version_tag.is_empty() => return record.version_tag,
            Ok(_) => {}
            Err(e) => warn!(%artifact, "Ignoring unreadable version record: {}", e),
        }

        let source = self.launcher_config.source(artifact);
        if let Some(declared) = source.declared_version.as_deref().map(VersionTag::parse) {
            if !declared.is_empty() {
                return declared;
            }
        }

        match artifact {
            ArtifactKind::Launcher => self.build_version.clone(),
            ArtifactKind::Client => VersionTag::default(),
        }
    }

    /// Decide whether `artifact` needs an update
    pub async fn check(&self, artifact: ArtifactKind) -> Result<UpdateCheck> {
        let source = self.launcher_config.source(artifact);
        let installed = self.installed_tag(artifact);

        let descriptor = match &source.endpoint {
            Some(endpoint) => self.releases.fetch_latest(endpoint, self.token.as_deref()).await,
            None => {
                debug!(%artifact, "No update endpoint configured");
                ReleaseDescriptor::empty()
            }
        };

        let policy = UpdatePolicy::from_minimum(source.min_version.as_deref());
        let preference = AssetPreference::from(&source);
        let mut verdict = evaluate_with(&installed, &descriptor, &policy, &preference);

        let client_missing = artifact == ArtifactKind::Client && dir_is_empty(&self.client_root());
        if client_missing && !verdict.has_update {
            info!("Client folder is empty, a download is required");
            verdict = missing_client_verdict(&installed, &descriptor, &source, &preference);
        }

        if artifact == ArtifactKind::Launcher && !verdict.has_update {
            if let Err(e) = ensure_record(self.store.as_ref(), artifact, &installed) {
                warn!("Could not create launcher version record: {}", e);
            }
        }

        info!(
            %artifact,
            installed = %installed,
            latest = %verdict.latest_tag,
            has_update = verdict.has_update,
            mandatory = verdict.mandatory,
            "Update check finished"
        );

        Ok(UpdateCheck {
            artifact,
            verdict,
            client_missing,
        })
    }

    /// Download and verify the artifact named by `check`
    pub async fn prepare(&self, check: &UpdateCheck) -> Result<PreparedUpdate> {
        let verdict = &check.verdict;
        let url = verdict
            .asset_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| UpdateError::NoAsset(format!("{} {}", check.artifact, verdict.latest_tag)))?;

        let staging = StagingArea::create(&self.config.update.staging_root())?;
        let name = verdict
            .asset_name
            .clone()
            .unwrap_or_else(|| url.rsplit('/').next().unwrap_or("artifact").to_string());
        let archive = staging.archive_path(&name);

        match self.fetch_and_verify(&url, verdict, &archive).await {
            Ok((bytes, integrity, checksum)) => Ok(PreparedUpdate {
                artifact: check.artifact,
                staging,
                archive,
                tag: verdict.latest_tag.clone(),
                source_url: url,
                checksum,
                integrity,
                bytes,
            }),
            Err(e) => {
                staging.cleanup_best_effort();
                Err(e)
            }
        }
    }

    async fn fetch_and_verify(
        &self,
        url: &str,
        verdict: &UpdateVerdict,
        archive: &Path,
    ) -> Result<(u64, IntegrityReport, String)> {
        let listener = self.listener.as_ref();
        let bytes = self
            .downloader
            .download(url, verdict.asset_api_url.as_deref(), archive, self.token.as_deref(), listener)
            .await?;

        let integrity = self
            .verifier
            .verify(archive, verdict.checksum_url.as_deref(), self.token.as_deref(), listener)
            .await?;
        let checksum = match &integrity.actual {
            Some(actual) => actual.clone(),
            None => compute_sha256(archive)?,
        };
        Ok((bytes, integrity, checksum))
    }

    /// Extract a prepared client archive into the client folder
    ///
    /// The record is written only when no entry failed. The staging area is
    /// removed either way since the archive is not reused.
    pub async fn apply_client(&self, prepared: PreparedUpdate) -> Result<ExtractionSummary> {
        let client_root = self.client_root();
        let lock = InstallLock::acquire(&client_root, self.config.update.lock_timeout()).await?;

        let extractor = ArchiveExtractor::new().with_excluded(self.config.update.excluded_files.clone());
        let summary = extractor.extract(&prepared.archive, &client_root, self.listener.as_ref());

        let summary = match summary {
            Ok(summary) => summary,
            Err(e) => {
                drop(lock);
                prepared.staging.cleanup_best_effort();
                return Err(e);
            }
        };

        if summary.is_clean() {
            let tag = if prepared.tag.is_empty() {
                self.installed_tag(ArtifactKind::Client)
            } else {
                prepared.tag.clone()
            };
            let record = InstalledVersionRecord::new(tag)
                .with_source_url(Some(prepared.source_url.clone()))
                .with_checksum(Some(prepared.checksum.clone()));
            self.store.write(ArtifactKind::Client, &record)?;
        } else {
            warn!(
                failed = summary.failed(),
                "Client extraction had failures, version record not updated"
            );
        }

        drop(lock);
        prepared.staging.cleanup_best_effort();
        Ok(summary)
    }

    /// Extract a launcher archive into staging and place the helper beside it
    ///
    /// `helper_source` is the running executable; `pid` is this process.
    pub fn stage_launcher(&self, prepared: &PreparedUpdate, helper_source: &Path, pid: u32) -> Result<Handoff> {
        let extraction = ArchiveExtractor::new().extract_to_staging(
            &prepared.archive,
            &prepared.staging,
            self.listener.as_ref(),
        )?;
        if !extraction.is_clean() {
            return Err(UpdateError::archive(format!(
                "{} of {} entries could not be extracted",
                extraction.failed(),
                extraction.total_files()
            )));
        }

        let helper_name = helper_source
            .file_name()
            .ok_or_else(|| UpdateError::launch(format!("invalid helper path {}", helper_source.display())))?;
        let helper = prepared.staging.root().join(helper_name);
        fs::copy(helper_source, &helper)?;

        let executable = self.launcher_executable(helper_source);
        let args = handoff_args(
            &prepared.staging.payload_dir(),
            &self.launcher_root,
            pid,
            &prepared.tag,
            &prepared.source_url,
            &prepared.checksum,
            &executable,
        );

        Ok(Handoff {
            helper,
            args,
            cwd: prepared.staging.root().to_path_buf(),
            extraction,
        })
    }

    /// Start the helper; the caller exits right after
    pub fn spawn_handoff(&self, handoff: &Handoff, process: &dyn ProcessControl) -> Result<u32> {
        info!("Handing over to {}", handoff.helper.display());
        process
            .spawn(&handoff.helper, &handoff.args, &handoff.cwd)
            .map_err(|e| UpdateError::launch(format!("could not start update helper: {}", e)))
    }

    /// Launcher executable relative to the launcher root
    pub fn launcher_executable(&self, running: &Path) -> PathBuf {
        self.launcher_config
            .launcher_executable
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| running.file_name().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("launcher"))
    }
}

/// Arguments for `apply` in the helper process
pub fn handoff_args(
    source_dir: &Path,
    target_dir: &Path,
    pid: u32,
    tag: &VersionTag,
    source_url: &str,
    checksum: &str,
    executable: &Path,
) -> Vec<String> {
    let mut args = vec![
        "apply".to_string(),
        "--source-dir".to_string(),
        source_dir.display().to_string(),
        "--target-dir".to_string(),
        target_dir.display().to_string(),
        "--pid".to_string(),
        pid.to_string(),
    ];

    let optional = [
        ("--version-tag", tag.as_str()),
        ("--source-url", source_url),
        ("--zip-checksum", checksum),
    ];
    for (flag, value) in optional {
        if !value.is_empty() {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
    }

    args.push("--exe".to_string());
    args.push(executable.display().to_string());
    args
}

/// Launcher configuration: remote copy, then local file, then defaults
pub async fn resolve_launcher_config(
    releases: &ReleaseMetadataClient,
    launcher_root: &Path,
    token: Option<&str>,
) -> LauncherConfig {
    let local = LauncherConfig::load_local(launcher_root);

    let remote_url = local
        .as_ref()
        .ok()
        .and_then(|config| config.new_config_url.clone())
        .filter(|u| !u.trim().is_empty());
    if let Some(url) = remote_url {
        if let Some(remote) = releases.fetch_launcher_config(&url, token).await {
            debug!("Using launcher config from {}", url);
            return remote;
        }
    }

    match local {
        Ok(config) => config,
        Err(e) => {
            debug!("Using minimal launcher config: {}", e);
            LauncherConfig::default()
        }
    }
}

fn missing_client_verdict(
    installed: &VersionTag,
    descriptor: &ReleaseDescriptor,
    source: &ArtifactSource,
    preference: &AssetPreference,
) -> UpdateVerdict {
    let from_release = evaluate_with(&VersionTag::default(), descriptor, &UpdatePolicy::default(), preference);
    if from_release.has_update {
        return UpdateVerdict {
            installed_tag: installed.clone(),
            ..from_release
        };
    }

    UpdateVerdict {
        has_update: true,
        mandatory: false,
        installed_tag: installed.clone(),
        latest_tag: source
            .declared_version
            .as_deref()
            .map(VersionTag::parse)
            .unwrap_or_default(),
        asset_name: Some(source.asset_name.clone()),
        asset_url: preference.direct_url.clone(),
        asset_api_url: None,
        asset_size: None,
        checksum_url: preference.checksum_url.clone(),
    }
}

fn dir_is_empty(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
