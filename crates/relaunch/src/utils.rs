//! Shared setup for commands

use anyhow::{anyhow, Context, Result};
use relaunch_core::types::{LauncherConfig, RuntimeConfig};
use relaunch_core::HierarchicalConfigLoader;
use relaunch_update::{resolve_launcher_config, ReleaseMetadataClient, UpdateFlow, UpdateListener};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Everything a command needs to talk about one installation
pub struct Session {
    pub config: RuntimeConfig,
    pub launcher_root: PathBuf,
    pub launcher_config: LauncherConfig,
}

impl Session {
    /// Load runtime configuration and the launcher configuration
    pub async fn open(global: &GlobalArgs) -> Result<Self> {
        let config = load_runtime_config(global)?;
        let launcher_root = launcher_root(global)?;

        let releases = ReleaseMetadataClient::new(&config.network)?;
        let token = config.auth.resolve_token();
        let launcher_config = resolve_launcher_config(&releases, &launcher_root, token.as_deref()).await;

        Ok(Self {
            config,
            launcher_root,
            launcher_config,
        })
    }

    pub fn flow(&self, listener: Arc<dyn UpdateListener>) -> Result<UpdateFlow> {
        let flow = UpdateFlow::new(
            self.config.clone(),
            &self.launcher_root,
            self.launcher_config.clone(),
        )?;
        Ok(flow.with_listener(listener))
    }
}

/// Runtime configuration with CLI overrides applied last
pub fn load_runtime_config(global: &GlobalArgs) -> Result<RuntimeConfig> {
    let loader = match &global.config_dir {
        Some(dir) => HierarchicalConfigLoader::with_dir(dir.clone()),
        None => HierarchicalConfigLoader::new().context("Failed to locate configuration directory")?,
    };
    let mut config = loader
        .load_runtime_config()
        .context("Failed to load runtime configuration")?;

    if let Some(mode) = global.integrity_mode {
        config.update.integrity_mode = mode;
    }
    Ok(config)
}

/// `--root`, else the directory holding this executable
pub fn launcher_root(global: &GlobalArgs) -> Result<PathBuf> {
    if let Some(root) = &global.root {
        return Ok(root.clone().into_std_path_buf());
    }
    let exe = env::current_exe().context("Failed to determine the running executable")?;
    exe.parent()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| anyhow!("Executable {} has no parent directory", exe.display()))
}
