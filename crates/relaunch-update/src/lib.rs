//! Update orchestration engine for the relaunch launcher
//!
//! Provides:
//! - Release tag normalization and ordering
//! - Latest-release lookup with neutral fallback on failure
//! - Update verdicts with minimum-version enforcement
//! - Resumable artifact download with progress reporting
//! - SHA-256 verification against published checksums
//! - Archive extraction with same-size change detection
//! - Live self-replacement: peer exit, locked-file copy retry, shadow swap,
//!   version record, relaunch with scripted fallback

pub mod decision;
pub mod download;
pub mod error;
pub mod extract;
pub mod flow;
pub mod integrity;
pub mod lock;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod releases;
pub mod staging;
pub mod store;
pub mod version;

pub use decision::{evaluate, evaluate_with, AssetPreference, UpdatePolicy, UpdateVerdict};
pub use download::{ArtifactDownloader, DownloadProgress};
pub use error::{Result, UpdateError};
pub use extract::{ArchiveEntryError, ArchiveExtractor, ArchiveFormat, ExtractionSummary};
pub use flow::{resolve_launcher_config, Handoff, PreparedUpdate, UpdateCheck, UpdateFlow};
pub use integrity::{compute_sha256, extract_digest, IntegrityReport, IntegrityVerifier};
pub use lock::InstallLock;
pub use orchestrator::{
    ApplyOutcome, ApplyReport, ApplyRequest, ApplySettings, ApplyState, FileOps, SelfReplaceOrchestrator, StdFileOps,
};
pub use process::{ProcessControl, SystemProcessControl};
pub use progress::{NoopListener, Progress, UpdateListener};
pub use releases::{ReleaseAsset, ReleaseDescriptor, ReleaseMetadataClient};
pub use staging::StagingArea;
pub use store::{ensure_record, InstalledVersionRecord, JsonVersionStore, VersionStore};
pub use version::{TagOrdering, VersionTag};

/// Current engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
