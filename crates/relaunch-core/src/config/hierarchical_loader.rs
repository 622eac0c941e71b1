//! Hierarchical configuration loader with precedence
//!
//! Loads runtime configuration from multiple sources (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Runtime config (~/.relaunch/relaunch-runtime.yaml)
//! 3. Environment variables (RELAUNCH_* prefix)
//! 4. CLI flags (handled by caller)

use crate::error::{Error, Result};
use crate::types::{RetryPoliciesConfig, RuntimeConfig};
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// File name of the user's runtime overrides inside the config directory
pub const RUNTIME_CONFIG_FILE: &str = "relaunch-runtime.yaml";

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

/// Configuration hierarchy loader
pub struct HierarchicalConfigLoader {
    config_dir: Utf8PathBuf,
}

impl HierarchicalConfigLoader {
    /// Loader rooted at `~/.relaunch`
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir()?;
        Ok(Self { config_dir })
    }

    /// Loader rooted at a custom directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    fn default_config_dir() -> Result<Utf8PathBuf> {
        let home = crate::utils::get_home_dir()
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|p| Error::invalid_config(format!("Home directory is not UTF-8: {:?}", p)))?;
        Ok(home.join(".relaunch"))
    }

    /// Load runtime configuration with hierarchical precedence
    pub fn load_runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = Self::load_embedded_config::<RuntimeConfig>("runtime-defaults.yaml")?;

        let runtime_config_path = self.config_dir.join(RUNTIME_CONFIG_FILE);
        if runtime_config_path.exists() {
            tracing::debug!("Loading runtime overrides from {}", runtime_config_path);
            let file_config = self.load_yaml_file::<RuntimeConfig>(&runtime_config_path)?;
            config = Self::merge_runtime_config(config, file_config);
        }

        self.apply_env_overrides(config)
    }

    fn load_embedded_config<T: DeserializeOwned>(filename: &str) -> Result<T> {
        let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", filename))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", filename))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                filename, e
            ))
        })
    }

    fn load_yaml_file<T: DeserializeOwned>(&self, path: &Utf8Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    /// Overlay sections replace base sections; retry policies merge per operation
    fn merge_runtime_config(base: RuntimeConfig, overlay: RuntimeConfig) -> RuntimeConfig {
        RuntimeConfig {
            network: overlay.network,
            retry_policies: Self::merge_retry_policies(base.retry_policies, overlay.retry_policies),
            update: overlay.update,
            auth: overlay.auth,
        }
    }

    fn merge_retry_policies(
        mut base: RetryPoliciesConfig,
        overlay: RetryPoliciesConfig,
    ) -> RetryPoliciesConfig {
        for (key, policy) in overlay.operations {
            base.operations.insert(key, policy);
        }
        base.default = overlay.default;
        base
    }

    fn apply_env_overrides(&self, mut config: RuntimeConfig) -> Result<RuntimeConfig> {
        if let Some(val) = env_parse("RELAUNCH_HTTP_TIMEOUT_SECS")? {
            config.network.http_timeout_secs = val;
        }

        if let Some(val) = env_parse("RELAUNCH_DOWNLOAD_TIMEOUT_SECS")? {
            config.network.download_timeout_secs = val;
        }

        if let Some(val) = env_parse("RELAUNCH_DOWNLOAD_CHUNK_SIZE")? {
            config.network.download_chunk_size = val;
        }

        if let Some(val) = env_parse("RELAUNCH_PEER_EXIT_TIMEOUT_SECS")? {
            config.update.peer_exit_timeout_secs = val;
        }

        if let Some(val) = env_parse("RELAUNCH_INTEGRITY_MODE")? {
            config.update.integrity_mode = val;
        }

        if let Some(val) = env_parse("RELAUNCH_APPLY_STRATEGY")? {
            config.update.apply_strategy = val;
        }

        if let Ok(val) = env::var("RELAUNCH_STAGING_DIR") {
            if !val.trim().is_empty() {
                config.update.staging_dir = Some(PathBuf::from(val.trim()));
            }
        }

        Ok(config)
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

/// Parse an environment variable, treating an unset variable as absent
fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_config(format!("{} has an invalid value: {}", name, val))),
        Err(_) => Ok(None),
    }
}
