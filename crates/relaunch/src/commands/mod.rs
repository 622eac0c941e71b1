//! CLI command implementations

pub mod apply;
pub mod check;
pub mod download_update;
pub mod launch;
pub mod update;
pub mod version;

use relaunch_core::types::ArtifactKind;

/// Artifacts a command should visit, launcher first
pub(crate) fn selected(artifact: Option<ArtifactKind>) -> Vec<ArtifactKind> {
    match artifact {
        Some(kind) => vec![kind],
        None => vec![ArtifactKind::Launcher, ArtifactKind::Client],
    }
}
