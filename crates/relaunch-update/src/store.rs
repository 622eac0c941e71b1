//! Installed version records
//!
//! The record is the only source of truth for what is installed. It is
//! written once per completed apply, after every file is in place.

use chrono::{DateTime, Utc};
use relaunch_core::types::ArtifactKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, UpdateError};
use crate::version::VersionTag;

/// Record file kept in the launcher root
pub const LAUNCHER_RECORD_FILE: &str = "versionlauncher.json";

/// Record file kept in the client folder
pub const CLIENT_RECORD_FILE: &str = "versions.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledVersionRecord {
    #[serde(alias = "installedAt")]
    pub installed_at_utc: DateTime<Utc>,

    /// Always stored cleaned
    #[serde(alias = "installedTag")]
    pub version_tag: VersionTag,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub source_url: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", rename = "zipChecksumSha256")]
    pub checksum_sha256: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub app_file_version: Option<String>,
}

impl InstalledVersionRecord {
    /// A record for `tag` installed now
    pub fn new(tag: impl Into<VersionTag>) -> Self {
        Self {
            installed_at_utc: Utc::now(),
            version_tag: tag.into(),
            source_url: None,
            checksum_sha256: None,
            app_file_version: None,
        }
    }

    pub fn with_source_url(mut self, url: Option<String>) -> Self {
        self.source_url = url.filter(|u| !u.is_empty());
        self
    }

    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum_sha256 = checksum
            .filter(|c| !c.is_empty())
            .map(|c| c.to_ascii_lowercase());
        self
    }

    pub fn with_app_file_version(mut self, version: Option<String>) -> Self {
        self.app_file_version = version.filter(|v| !v.is_empty());
        self
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Reads and writes installed version records
pub trait VersionStore: Send + Sync {
    /// `Ok(None)` when no record exists yet
    fn read(&self, artifact: ArtifactKind) -> Result<Option<InstalledVersionRecord>>;

    /// Replace the record for `artifact`
    fn write(&self, artifact: ArtifactKind, record: &InstalledVersionRecord) -> Result<()>;
}

/// One JSON file per artifact
#[derive(Debug, Clone, Default)]
pub struct JsonVersionStore {
    paths: HashMap<ArtifactKind, PathBuf>,
}

impl JsonVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the record for `artifact` at `path`
    pub fn with_path(mut self, artifact: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(artifact, path.into());
        self
    }

    /// Launcher record in `launcher_root`
    pub fn for_launcher(launcher_root: &Path) -> Self {
        Self::new().with_path(ArtifactKind::Launcher, launcher_root.join(LAUNCHER_RECORD_FILE))
    }

    /// Client record in `client_root`
    pub fn for_client(client_root: &Path) -> Self {
        Self::new().with_path(ArtifactKind::Client, client_root.join(CLIENT_RECORD_FILE))
    }

    /// Both records for a standard layout
    pub fn for_layout(launcher_root: &Path, client_root: &Path) -> Self {
        Self::for_launcher(launcher_root)
            .with_path(ArtifactKind::Client, client_root.join(CLIENT_RECORD_FILE))
    }

    pub fn path(&self, artifact: ArtifactKind) -> Option<&Path> {
        self.paths.get(&artifact).map(PathBuf::as_path)
    }
}

impl VersionStore for JsonVersionStore {
    fn read(&self, artifact: ArtifactKind) -> Result<Option<InstalledVersionRecord>> {
        let Some(path) = self.path(artifact) else {
            return Ok(None);
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: InstalledVersionRecord = serde_json::from_str(&content)
            .map_err(|e| UpdateError::manifest(format!("{}: {}", path.display(), e)))?;
        debug!(%artifact, tag = %record.version_tag, "Read version record");
        Ok(Some(record))
    }

    fn write(&self, artifact: ArtifactKind, record: &InstalledVersionRecord) -> Result<()> {
        let path = self
            .path(artifact)
            .ok_or_else(|| UpdateError::manifest(format!("no record location for {}", artifact)))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| UpdateError::manifest(e.to_string()))?;

        // write beside the target and rename so readers never see half a file
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| UpdateError::Io(e.error))?;

        info!(%artifact, tag = %record.version_tag, "Wrote version record to {}", path.display());
        Ok(())
    }
}

/// The existing record, or a new one for `fallback` persisted now
pub fn ensure_record(
    store: &dyn VersionStore,
    artifact: ArtifactKind,
    fallback: &VersionTag,
) -> Result<InstalledVersionRecord> {
    if let Some(record) = store.read(artifact)? {
        return Ok(record);
    }

    let record = InstalledVersionRecord::new(fallback.clone());
    store.write(artifact, &record)?;
    Ok(record)
}
