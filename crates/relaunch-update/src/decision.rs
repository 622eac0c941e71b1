//! Update verdicts
//!
//! Combines the installed tag, the latest release descriptor and the
//! minimum-version policy into a single [`UpdateVerdict`].

use relaunch_core::types::ArtifactSource;
use tracing::debug;

use crate::releases::ReleaseDescriptor;
use crate::version::{TagOrdering, VersionTag};

/// Minimum-version policy for one artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePolicy {
    pub minimum_version: Option<VersionTag>,
    pub mandatory_if_below_minimum: bool,
}

impl UpdatePolicy {
    /// Policy with a minimum; being below it makes the update mandatory
    pub fn from_minimum(minimum: Option<&str>) -> Self {
        let minimum_version = minimum.map(VersionTag::parse).filter(|tag| !tag.is_empty());
        Self {
            mandatory_if_below_minimum: minimum_version.is_some(),
            minimum_version,
        }
    }

    /// Whether `installed` falls below the configured minimum
    ///
    /// Unknown installed tags and tags that cannot be ordered against the
    /// minimum never count as below it.
    pub fn is_below_minimum(&self, installed: &VersionTag) -> bool {
        match &self.minimum_version {
            Some(minimum) if self.mandatory_if_below_minimum && !installed.is_empty() => {
                installed.compare(minimum) == TagOrdering::Less
            }
            _ => false,
        }
    }
}

/// Which asset of a release to fetch, and what overrides apply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetPreference {
    pub name: Option<String>,
    pub checksum_url: Option<String>,
    /// Download URL used instead of the release asset
    pub direct_url: Option<String>,
}

impl From<&ArtifactSource> for AssetPreference {
    fn from(source: &ArtifactSource) -> Self {
        Self {
            name: Some(source.asset_name.clone()),
            checksum_url: source.checksum_url.clone(),
            direct_url: source.direct_url.clone(),
        }
    }
}

/// Outcome of one update check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateVerdict {
    pub has_update: bool,
    /// Always implies `has_update`
    pub mandatory: bool,
    pub installed_tag: VersionTag,
    pub latest_tag: VersionTag,
    pub asset_name: Option<String>,
    pub asset_url: Option<String>,
    pub asset_api_url: Option<String>,
    pub asset_size: Option<u64>,
    pub checksum_url: Option<String>,
}

impl UpdateVerdict {
    /// A verdict that nothing needs to happen
    pub fn up_to_date(installed: VersionTag, latest: VersionTag) -> Self {
        Self {
            installed_tag: installed,
            latest_tag: latest,
            ..Self::default()
        }
    }
}

/// Evaluate using the first payload asset of the release
pub fn evaluate(
    installed: &VersionTag,
    descriptor: &ReleaseDescriptor,
    policy: &UpdatePolicy,
) -> UpdateVerdict {
    evaluate_with(installed, descriptor, policy, &AssetPreference::default())
}

/// Evaluate an update check
///
/// 1. No confirmed remote tag means no update.
/// 2. Equal tags mean no update.
/// 3. A newer remote tag means an update.
/// 4. Tags that differ but cannot be ordered mean an update.
/// 5. An installed tag below the policy minimum forces a mandatory update.
pub fn evaluate_with(
    installed: &VersionTag,
    descriptor: &ReleaseDescriptor,
    policy: &UpdatePolicy,
    preference: &AssetPreference,
) -> UpdateVerdict {
    let latest = descriptor.tag.clone();

    if latest.is_empty() {
        debug!(installed = %installed, "No confirmed remote tag, assuming no update");
        return UpdateVerdict::up_to_date(installed.clone(), latest);
    }

    let ordering = installed.compare(&latest);
    let mut has_update = match ordering {
        TagOrdering::Equal | TagOrdering::Greater => false,
        TagOrdering::Less => true,
        TagOrdering::Incomparable => !installed.as_str().eq_ignore_ascii_case(latest.as_str()),
    };

    let mandatory = policy.is_below_minimum(installed);
    if mandatory {
        has_update = true;
    }

    debug!(
        installed = %installed,
        latest = %latest,
        ?ordering,
        has_update,
        mandatory,
        "Evaluated update"
    );

    if !has_update {
        return UpdateVerdict::up_to_date(installed.clone(), latest);
    }

    let asset = descriptor.select_asset(preference.name.as_deref().unwrap_or(""));
    let asset_name = asset
        .map(|a| a.name.clone())
        .or_else(|| preference.name.clone());

    let asset_url = preference
        .direct_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| asset.map(|a| a.download_url.clone()));

    // The API URL only applies to the release asset itself
    let asset_api_url = if preference.direct_url.as_deref().is_some_and(|u| !u.trim().is_empty()) {
        None
    } else {
        asset.and_then(|a| a.api_url.clone())
    };

    let checksum_url = preference
        .checksum_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| {
            asset_name
                .as_deref()
                .and_then(|name| descriptor.checksum_url_for(name))
        });

    UpdateVerdict {
        has_update,
        mandatory,
        installed_tag: installed.clone(),
        latest_tag: latest,
        asset_name,
        asset_url,
        asset_api_url,
        asset_size: asset.and_then(|a| a.size),
        checksum_url,
    }
}
