//! Type definitions shared across relaunch crates

mod launcher_config;
mod runtime_config;

pub use launcher_config::*;
pub use runtime_config::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The installable units the launcher keeps current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The launcher itself; replaced by a helper process after it exits
    Launcher,
    /// The companion client package; replaced in place while it is not running
    Client,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Launcher => "launcher",
            ArtifactKind::Client => "client",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "launcher" => Ok(ArtifactKind::Launcher),
            "client" => Ok(ArtifactKind::Client),
            other => Err(format!(
                "unknown artifact '{}', expected 'launcher' or 'client'",
                other
            )),
        }
    }
}
