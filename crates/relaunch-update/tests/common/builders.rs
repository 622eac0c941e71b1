//! Builders for release descriptors and launcher configuration

use relaunch_core::types::LauncherConfig;
use serde_json::{json, Value};

use super::constants::*;

/// Builds the JSON body of a latest-release response
#[derive(Debug, Clone)]
pub struct ReleaseJsonBuilder {
    tag_name: String,
    assets: Vec<Value>,
    next_id: u64,
}

impl ReleaseJsonBuilder {
    pub fn new() -> Self {
        Self {
            tag_name: TAG_V1_0_0.to_string(),
            assets: Vec::new(),
            next_id: 1,
        }
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag_name = tag.to_string();
        self
    }

    /// Asset downloadable from `{base}/download/{name}`
    pub fn asset(mut self, base: &str, name: &str, size: u64) -> Self {
        let id = self.next_id;
        self.next_id += 1;
        self.assets.push(json!({
            "id": id,
            "name": name,
            "size": size,
            "browser_download_url": format!("{}/download/{}", base, name),
            "url": format!("{}/api/assets/{}", base, id),
        }));
        self
    }

    /// Asset without an API url, to exercise URL derivation
    pub fn asset_without_api_url(mut self, base: &str, name: &str) -> Self {
        let id = self.next_id;
        self.next_id += 1;
        self.assets.push(json!({
            "id": id,
            "name": name,
            "browser_download_url": format!("{}/download/{}", base, name),
        }));
        self
    }

    pub fn build(self) -> Value {
        json!({
            "tag_name": self.tag_name,
            "name": format!("Release {}", self.tag_name),
            "assets": self.assets,
        })
    }
}

impl Default for ReleaseJsonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a [`LauncherConfig`] pointing at a mock server
#[derive(Debug, Clone, Default)]
pub struct LauncherConfigBuilder {
    config: LauncherConfig,
}

impl LauncherConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launcher_endpoint(mut self, url: String) -> Self {
        self.config.launcher_update_endpoint = Some(url);
        self
    }

    pub fn client_endpoint(mut self, url: String) -> Self {
        self.config.client_update_endpoint = Some(url);
        self
    }

    pub fn client_folder(mut self, folder: &str) -> Self {
        self.config.client_folder = Some(folder.to_string());
        self
    }

    pub fn client_min_version(mut self, version: &str) -> Self {
        self.config.client_min_version = Some(version.to_string());
        self
    }

    pub fn launcher_version(mut self, version: &str) -> Self {
        self.config.launcher_version = Some(version.to_string());
        self
    }

    pub fn launcher_executable(mut self, name: &str) -> Self {
        self.config.launcher_executable = Some(name.to_string());
        self
    }

    pub fn build(self) -> LauncherConfig {
        self.config
    }
}
