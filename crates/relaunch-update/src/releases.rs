//! Latest-release metadata
//!
//! The release host is treated as unreliable: any transport failure, error
//! status or malformed body yields an empty [`ReleaseDescriptor`] and a
//! warning, never an error. An empty tag then reads as "no update known".

use relaunch_core::types::{LauncherConfig, NetworkConfig};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, UpdateError};
use crate::version::VersionTag;

/// Asset names that hold digests rather than payloads
const CHECKSUM_FILE_NAMES: &[&str] = &["sha256sums", "sha256sums.txt", "checksums.txt"];

/// One downloadable file attached to a release
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseAsset {
    pub name: String,
    /// Public download URL
    pub download_url: String,
    /// API URL that serves the bytes with `Accept: application/octet-stream`
    pub api_url: Option<String>,
    pub id: Option<u64>,
    pub size: Option<u64>,
}

impl ReleaseAsset {
    /// Digest files published next to the payloads
    pub fn is_checksum_file(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        name.ends_with(".sha256") || CHECKSUM_FILE_NAMES.contains(&name.as_str())
    }
}

/// Snapshot of one latest-release fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseDescriptor {
    pub tag: VersionTag,
    pub assets: Vec<ReleaseAsset>,
    /// Release-wide checksum file, when one was published
    pub checksum_reference_url: Option<String>,
}

impl ReleaseDescriptor {
    /// The neutral descriptor returned when the fetch fails
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tag.is_empty()
    }

    /// Asset named `name` (case-insensitive), else the first payload asset
    pub fn select_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .or_else(|| self.assets.iter().find(|a| !a.is_checksum_file()))
    }

    /// `<asset>.sha256` if published, else the release-wide checksum file
    pub fn checksum_url_for(&self, asset_name: &str) -> Option<String> {
        let sidecar = format!("{}.sha256", asset_name);
        self.assets
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(&sidecar))
            .map(|a| a.download_url.clone())
            .or_else(|| self.checksum_reference_url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    assets: Vec<AssetResponse>,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    name: String,
    #[serde(default)]
    browser_download_url: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    size: Option<u64>,
}

/// Fetches latest-release descriptors and published launcher configuration
pub struct ReleaseMetadataClient {
    client: reqwest::Client,
}

impl ReleaseMetadataClient {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&network.user_agent)
            .timeout(Duration::from_secs(network.http_timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Latest release at `endpoint`, or an empty descriptor on any failure
    pub async fn fetch_latest(&self, endpoint: &str, token: Option<&str>) -> ReleaseDescriptor {
        match self.try_fetch_latest(endpoint, token).await {
            Ok(descriptor) => {
                debug!(
                    tag = %descriptor.tag,
                    assets = descriptor.assets.len(),
                    "Fetched latest release"
                );
                descriptor
            }
            Err(e) => {
                warn!("Could not fetch latest release from {}: {}", endpoint, e);
                ReleaseDescriptor::empty()
            }
        }
    }

    async fn try_fetch_latest(&self, endpoint: &str, token: Option<&str>) -> Result<ReleaseDescriptor> {
        debug!("Fetching latest release from: {}", endpoint);

        let body = self.get_text(endpoint, token).await?;
        let release: ReleaseResponse = serde_json::from_str(&body)
            .map_err(|e| UpdateError::Config(relaunch_core::Error::from(e)))?;

        let assets: Vec<ReleaseAsset> = release
            .assets
            .into_iter()
            .map(|asset| {
                let api_url = asset
                    .url
                    .filter(|u| !u.trim().is_empty())
                    .or_else(|| asset.id.and_then(|id| derive_asset_api_url(endpoint, id)));
                ReleaseAsset {
                    name: asset.name,
                    download_url: asset.browser_download_url,
                    api_url,
                    id: asset.id,
                    size: asset.size,
                }
            })
            .collect();

        let checksum_reference_url = assets
            .iter()
            .find(|a| CHECKSUM_FILE_NAMES.contains(&a.name.to_ascii_lowercase().as_str()))
            .map(|a| a.download_url.clone());

        Ok(ReleaseDescriptor {
            tag: VersionTag::parse(&release.tag_name),
            assets,
            checksum_reference_url,
        })
    }

    /// Published launcher configuration, or `None` on any failure
    pub async fn fetch_launcher_config(&self, url: &str, token: Option<&str>) -> Option<LauncherConfig> {
        let body = match self.get_text(url, token).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Could not fetch launcher config from {}: {}", url, e);
                return None;
            }
        };

        match LauncherConfig::from_json_str(&body) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring malformed launcher config from {}: {}", url, e);
                None
            }
        }
    }

    async fn get_text(&self, url: &str, token: Option<&str>) -> Result<String> {
        let mut request = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

/// `{base}/repos/{owner}/{repo}/releases/assets/{id}` for an endpoint under
/// `/repos/{owner}/{repo}`
pub fn derive_asset_api_url(endpoint: &str, asset_id: u64) -> Option<String> {
    let mut url = Url::parse(endpoint).ok()?;
    let segments: Vec<String> = url.path_segments()?.map(str::to_string).collect();
    let repos = segments.iter().position(|s| s == "repos")?;
    let owner = segments.get(repos + 1).filter(|s| !s.is_empty())?;
    let repo = segments.get(repos + 2).filter(|s| !s.is_empty())?;

    let prefix = segments[..repos].join("/");
    let path = if prefix.is_empty() {
        format!("/repos/{}/{}/releases/assets/{}", owner, repo, asset_id)
    } else {
        format!("/{}/repos/{}/{}/releases/assets/{}", prefix, owner, repo, asset_id)
    };
    url.set_path(&path);
    url.set_query(None);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            download_url: format!("https://example.com/{}", name),
            api_url: None,
            id: None,
            size: None,
        }
    }

    #[test]
    fn test_derive_asset_api_url() {
        assert_eq!(
            derive_asset_api_url("https://api.github.com/repos/acme/launcher/releases/latest", 77),
            Some("https://api.github.com/repos/acme/launcher/releases/assets/77".to_string())
        );
        assert_eq!(
            derive_asset_api_url("http://127.0.0.1:8080/api/v3/repos/acme/game/releases/latest", 1),
            Some("http://127.0.0.1:8080/api/v3/repos/acme/game/releases/assets/1".to_string())
        );
        assert_eq!(derive_asset_api_url("https://example.com/latest.json", 1), None);
        assert_eq!(derive_asset_api_url("not a url", 1), None);
    }

    #[test]
    fn test_select_asset_prefers_configured_name() {
        let descriptor = ReleaseDescriptor {
            tag: VersionTag::parse("v1.0.0"),
            assets: vec![asset("SHA256SUMS"), asset("other.zip"), asset("Launcher.zip")],
            checksum_reference_url: None,
        };

        assert_eq!(descriptor.select_asset("launcher.zip").unwrap().name, "Launcher.zip");
        assert_eq!(descriptor.select_asset("missing.zip").unwrap().name, "other.zip");
    }

    #[test]
    fn test_select_asset_skips_checksum_files() {
        let descriptor = ReleaseDescriptor {
            tag: VersionTag::parse("v1.0.0"),
            assets: vec![asset("launcher.zip.sha256"), asset("checksums.txt")],
            checksum_reference_url: None,
        };
        assert!(descriptor.select_asset("launcher.zip").is_none());
    }

    #[test]
    fn test_checksum_url_prefers_sidecar() {
        let descriptor = ReleaseDescriptor {
            tag: VersionTag::parse("v1.0.0"),
            assets: vec![asset("launcher.zip"), asset("launcher.zip.sha256")],
            checksum_reference_url: Some("https://example.com/SHA256SUMS".to_string()),
        };
        assert_eq!(
            descriptor.checksum_url_for("launcher.zip"),
            Some("https://example.com/launcher.zip.sha256".to_string())
        );
        assert_eq!(
            descriptor.checksum_url_for("client.zip"),
            Some("https://example.com/SHA256SUMS".to_string())
        );
    }

    #[test]
    fn test_empty_descriptor() {
        let descriptor = ReleaseDescriptor::empty();
        assert!(descriptor.is_empty());
        assert!(descriptor.assets.is_empty());
    }
}
