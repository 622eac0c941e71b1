//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use relaunch_core::types::{ApplyStrategy, ArtifactKind, IntegrityMode};
use std::path::{Path, PathBuf};

/// relaunch - self-updating launcher
#[derive(Parser, Debug)]
#[command(name = "relaunch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that touches an installation
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Directory holding relaunch-runtime.yaml (default: ~/.relaunch)
    #[arg(long, global = true, env = "RELAUNCH_CONFIG_DIR")]
    pub config_dir: Option<Utf8PathBuf>,

    /// Launcher installation root (default: directory of this executable)
    #[arg(long, global = true, env = "RELAUNCH_ROOT")]
    pub root: Option<Utf8PathBuf>,

    /// Override the checksum policy (enforce, advisory)
    #[arg(long, global = true)]
    pub integrity_mode: Option<IntegrityMode>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the launcher and client for updates
    Check(CheckArgs),

    /// Install available updates
    Update(UpdateArgs),

    /// Download a specific launcher build and hand over to the update helper
    #[command(disable_version_flag = true)]
    DownloadUpdate(DownloadUpdateArgs),

    /// Replace an installation from a staged payload (update helper)
    Apply(ApplyArgs),

    /// Start the client
    Launch(LaunchArgs),

    /// Show version information
    Version(VersionArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Only check this artifact (launcher, client)
    #[arg(long)]
    pub artifact: Option<ArtifactKind>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Only update this artifact (launcher, client)
    #[arg(long)]
    pub artifact: Option<ArtifactKind>,

    /// Skip confirmation prompts
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Start the client once it is up to date
    #[arg(long)]
    pub launch: bool,
}

#[derive(Args, Debug)]
pub struct DownloadUpdateArgs {
    /// Download URL of the launcher archive
    #[arg(long)]
    pub url: String,

    /// Release tag of the archive
    #[arg(long)]
    pub version: String,

    /// API URL of the asset, used when a token is available
    #[arg(long)]
    pub api_url: Option<String>,

    /// Checksum reference URL
    #[arg(long)]
    pub checksum_url: Option<String>,
}

/// Accepts `<SOURCE_DIR> <TARGET_DIR> <PID>` or the named flags
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Staged payload directory
    #[arg(value_name = "SOURCE_DIR", conflicts_with = "source_dir")]
    pub source_pos: Option<PathBuf>,

    /// Installation root to replace
    #[arg(value_name = "TARGET_DIR", conflicts_with = "target_dir")]
    pub target_pos: Option<PathBuf>,

    /// Process to wait for
    #[arg(value_name = "PID", conflicts_with = "pid")]
    pub pid_pos: Option<u32>,

    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    #[arg(long)]
    pub target_dir: Option<PathBuf>,

    #[arg(long)]
    pub pid: Option<u32>,

    /// Tag recorded as installed once the copy succeeds
    #[arg(long)]
    pub version_tag: Option<String>,

    #[arg(long)]
    pub source_url: Option<String>,

    /// SHA-256 of the archive the payload came from
    #[arg(long)]
    pub zip_checksum: Option<String>,

    /// Executable to relaunch, relative to the target directory
    #[arg(long)]
    pub exe: Option<PathBuf>,

    /// Which installation is being replaced
    #[arg(long, default_value = "launcher")]
    pub artifact: ArtifactKind,

    /// Override the apply strategy (shadow-swap, direct-overwrite)
    #[arg(long)]
    pub strategy: Option<ApplyStrategy>,

    /// Restart without asking
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl ApplyArgs {
    pub fn source(&self) -> Option<&Path> {
        self.source_dir.as_deref().or(self.source_pos.as_deref())
    }

    pub fn target(&self) -> Option<&Path> {
        self.target_dir.as_deref().or(self.target_pos.as_deref())
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pid.or(self.pid_pos)
    }
}

#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Start even if the client has never been installed through relaunch
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_args(args: &[&str]) -> ApplyArgs {
        let mut argv = vec!["relaunch", "apply"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Apply(args) => args,
            other => panic!("expected apply, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_positional_form() {
        let args = apply_args(&["/stage/payload", "/opt/launcher", "4242"]);
        assert_eq!(args.source(), Some(Path::new("/stage/payload")));
        assert_eq!(args.target(), Some(Path::new("/opt/launcher")));
        assert_eq!(args.process_id(), Some(4242));
        assert!(args.version_tag.is_none());
    }

    #[test]
    fn test_apply_named_form_with_both_value_styles() {
        let args = apply_args(&[
            "--source-dir=/stage/payload",
            "--target-dir",
            "/opt/launcher",
            "--pid=4242",
            "--version-tag",
            "v1.2.0",
            "--source-url=https://example.com/launcher.zip",
            "--zip-checksum",
            "abc123",
            "--exe=launcher",
        ]);
        assert_eq!(args.source(), Some(Path::new("/stage/payload")));
        assert_eq!(args.target(), Some(Path::new("/opt/launcher")));
        assert_eq!(args.process_id(), Some(4242));
        assert_eq!(args.version_tag.as_deref(), Some("v1.2.0"));
        assert_eq!(args.source_url.as_deref(), Some("https://example.com/launcher.zip"));
        assert_eq!(args.zip_checksum.as_deref(), Some("abc123"));
        assert_eq!(args.exe.as_deref(), Some(Path::new("launcher")));
        assert_eq!(args.artifact, ArtifactKind::Launcher);
    }

    #[test]
    fn test_apply_rejects_both_forms_for_same_value() {
        let result = Cli::try_parse_from([
            "relaunch",
            "apply",
            "/stage/payload",
            "--source-dir",
            "/other",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_strategy_override() {
        let args = apply_args(&["--strategy", "direct-overwrite", "/a", "/b", "1"]);
        assert_eq!(args.strategy, Some(ApplyStrategy::DirectOverwrite));
    }

    #[test]
    fn test_download_update_flags() {
        let cli = Cli::try_parse_from([
            "relaunch",
            "download-update",
            "--url=https://example.com/launcher.zip",
            "--version=v2.0.0",
        ])
        .unwrap();
        match cli.command {
            Commands::DownloadUpdate(args) => {
                assert_eq!(args.url, "https://example.com/launcher.zip");
                assert_eq!(args.version, "v2.0.0");
                assert!(args.api_url.is_none());
            }
            other => panic!("expected download-update, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["relaunch", "check", "--root", "/opt/launcher", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.global.root.as_deref().map(|p| p.as_str()), Some("/opt/launcher"));
    }

    #[test]
    fn test_check_artifact_filter() {
        let cli = Cli::try_parse_from(["relaunch", "check", "--artifact", "client", "--json"]).unwrap();
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.artifact, Some(ArtifactKind::Client));
                assert!(args.json);
            }
            other => panic!("expected check, got {:?}", other),
        }
    }
}
