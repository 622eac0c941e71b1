//! `launcher_config.json`: where the artifacts live and where their
//! releases are published

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::ArtifactKind;
use crate::error::{Error, Result};

/// File name of the launcher configuration inside the launcher root
pub const LAUNCHER_CONFIG_FILE: &str = "launcher_config.json";

const DEFAULT_CLIENT_EXECUTABLE: &str = "client.exe";
const DEFAULT_CLIENT_FOLDER: &str = "client";
const DEFAULT_LAUNCHER_ASSET: &str = "launcher.zip";
const DEFAULT_CLIENT_ASSET: &str = "client-to-update.zip";

/// Artifact layout and release sources, as published alongside the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherConfig {
    #[serde(default)]
    pub client_version: Option<String>,

    #[serde(default)]
    pub launcher_version: Option<String>,

    /// Client install folder, relative to the launcher root unless absolute
    #[serde(default)]
    pub client_folder: Option<String>,

    /// Executable started by `launch`, looked up under `<clientFolder>/bin`
    #[serde(default)]
    pub client_executable: Option<String>,

    /// Executable relaunched after a launcher update
    #[serde(default)]
    pub launcher_executable: Option<String>,

    /// Direct download URL for the client archive; bypasses release assets
    #[serde(default)]
    pub new_client_url: Option<String>,

    /// Where a fresher copy of this file is published
    #[serde(default)]
    pub new_config_url: Option<String>,

    #[serde(default)]
    pub launcher_update_endpoint: Option<String>,

    #[serde(default)]
    pub launcher_asset_name: Option<String>,

    #[serde(default)]
    pub launcher_checksum_url: Option<String>,

    #[serde(default)]
    pub launcher_min_version: Option<String>,

    #[serde(default)]
    pub client_update_endpoint: Option<String>,

    #[serde(default)]
    pub client_asset_name: Option<String>,

    #[serde(default)]
    pub client_checksum_url: Option<String>,

    #[serde(default)]
    pub client_min_version: Option<String>,
}

/// The release source of one artifact, resolved from [`LauncherConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSource {
    pub kind: ArtifactKind,
    /// Release metadata endpoint returning the latest release JSON
    pub endpoint: Option<String>,
    pub asset_name: String,
    pub checksum_url: Option<String>,
    pub min_version: Option<String>,
    /// Version declared in the config file, used when no record exists
    pub declared_version: Option<String>,
    /// Download URL that overrides the release asset
    pub direct_url: Option<String>,
}

impl LauncherConfig {
    /// Parse a configuration document
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load `launcher_config.json` from a launcher root
    pub fn load_local(launcher_root: &Path) -> Result<Self> {
        let path = launcher_root.join(LAUNCHER_CONFIG_FILE);
        if !path.exists() {
            return Err(Error::config_not_found(path.display().to_string()));
        }
        let content = fs::read_to_string(&path)?;
        Self::from_json_str(&content)
    }

    /// Local file if readable, the minimal default otherwise
    pub fn load_local_or_default(launcher_root: &Path) -> Self {
        match Self::load_local(launcher_root) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using minimal launcher config: {}", e);
                Self::default()
            }
        }
    }

    pub fn client_executable(&self) -> &str {
        non_empty(&self.client_executable).unwrap_or(DEFAULT_CLIENT_EXECUTABLE)
    }

    /// Absolute client install root
    pub fn client_root(&self, launcher_root: &Path) -> PathBuf {
        let folder = non_empty(&self.client_folder).unwrap_or(DEFAULT_CLIENT_FOLDER);
        let folder = Path::new(folder);
        if folder.is_absolute() {
            folder.to_path_buf()
        } else {
            launcher_root.join(folder)
        }
    }

    /// `<clientFolder>/bin/<clientExecutable>`
    pub fn client_launch_path(&self, launcher_root: &Path) -> PathBuf {
        self.client_root(launcher_root)
            .join("bin")
            .join(self.client_executable())
    }

    /// Release source for one artifact
    pub fn source(&self, kind: ArtifactKind) -> ArtifactSource {
        match kind {
            ArtifactKind::Launcher => ArtifactSource {
                kind,
                endpoint: owned(&self.launcher_update_endpoint),
                asset_name: non_empty(&self.launcher_asset_name)
                    .unwrap_or(DEFAULT_LAUNCHER_ASSET)
                    .to_string(),
                checksum_url: owned(&self.launcher_checksum_url),
                min_version: owned(&self.launcher_min_version),
                declared_version: owned(&self.launcher_version),
                direct_url: None,
            },
            ArtifactKind::Client => ArtifactSource {
                kind,
                endpoint: owned(&self.client_update_endpoint),
                asset_name: non_empty(&self.client_asset_name)
                    .unwrap_or(DEFAULT_CLIENT_ASSET)
                    .to_string(),
                checksum_url: owned(&self.client_checksum_url),
                min_version: owned(&self.client_min_version),
                declared_version: owned(&self.client_version),
                direct_url: owned(&self.new_client_url),
            },
        }
    }

    /// Rewrite only `launcherVersion` in an installed configuration file
    ///
    /// Keys this struct does not know about are preserved. A missing file is
    /// left missing.
    pub fn stamp_launcher_version(launcher_root: &Path, version: &str) -> Result<bool> {
        let path = launcher_root.join(LAUNCHER_CONFIG_FILE);
        if !path.exists() {
            return Ok(false);
        }

        let content = fs::read_to_string(&path)?;
        let mut document: serde_json::Value = serde_json::from_str(&content)?;
        let object = document
            .as_object_mut()
            .ok_or_else(|| Error::invalid_config(format!("{} is not a JSON object", path.display())))?;
        object.insert(
            "launcherVersion".to_string(),
            serde_json::Value::String(version.to_string()),
        );

        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        Ok(true)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn owned(value: &Option<String>) -> Option<String> {
    non_empty(value).map(str::to_string)
}
