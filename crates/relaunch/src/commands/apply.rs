//! Apply command
//!
//! Runs in the update helper: waits for the launcher to exit, replaces the
//! installation from the staged payload and restarts it.

use anyhow::{anyhow, Context, Result};
use relaunch_core::types::ArtifactKind;
use relaunch_update::{
    ApplyOutcome, ApplyRequest, ApplySettings, JsonVersionStore, SelfReplaceOrchestrator, SystemProcessControl,
    VersionStore, VersionTag,
};
use std::sync::Arc;

use crate::cli::{ApplyArgs, GlobalArgs};
use crate::listener::TerminalListener;
use crate::output;
use crate::utils::load_runtime_config;

pub async fn run(args: ApplyArgs, global: &GlobalArgs) -> Result<()> {
    let request = build_request(&args)?;

    let config = load_runtime_config(global)?;
    let mut settings = ApplySettings::from_config(&config);
    if let Some(strategy) = args.strategy {
        settings.strategy = strategy;
    }

    let store: Arc<dyn VersionStore> = match request.artifact {
        ArtifactKind::Launcher => Arc::new(JsonVersionStore::for_launcher(&request.target_dir)),
        ArtifactKind::Client => Arc::new(JsonVersionStore::for_client(&request.target_dir)),
    };
    let listener = Arc::new(TerminalListener::new(args.yes));

    let orchestrator = SelfReplaceOrchestrator::new(settings, store)
        .with_process_control(Arc::new(SystemProcessControl))
        .with_listener(listener.clone());

    let report = orchestrator
        .run(&request)
        .await
        .context("Update could not be applied; the previous installation is unchanged")?;
    listener.finish();

    tracing::debug!(strategy = %report.strategy, files = report.files_copied, "Apply finished");
    match report.outcome {
        ApplyOutcome::Relaunched { pid } => {
            output::success(&format!("Update installed, restarted (pid {})", pid));
        }
        ApplyOutcome::RestartPending => {
            output::info("Update installed; it takes effect the next time you start the launcher");
        }
        ApplyOutcome::RelaunchFailed { message } => {
            output::warning(&format!("Update installed, but restarting failed: {}", message));
        }
        ApplyOutcome::Applied => {
            output::success(&format!("Update installed ({} files)", report.files_copied));
        }
    }
    Ok(())
}

fn build_request(args: &ApplyArgs) -> Result<ApplyRequest> {
    let source = args
        .source()
        .ok_or_else(|| anyhow!("Missing source directory (--source-dir or first argument)"))?;
    let target = args
        .target()
        .ok_or_else(|| anyhow!("Missing target directory (--target-dir or second argument)"))?;

    Ok(ApplyRequest::new(args.artifact, source, target)
        .with_pid(args.process_id().filter(|pid| *pid > 0))
        .with_version_tag(args.version_tag.as_deref().map(VersionTag::parse))
        .with_source_url(args.source_url.clone().filter(|u| !u.is_empty()))
        .with_checksum(args.zip_checksum.clone().filter(|c| !c.is_empty()))
        .with_executable(args.exe.clone()))
}
