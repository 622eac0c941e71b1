//! Update command

use anyhow::{Context, Result};
use relaunch_core::types::ArtifactKind;
use relaunch_core::utils::human_readable_size;
use relaunch_update::{
    ExtractionSummary, IntegrityReport, SystemProcessControl, UpdateCheck, UpdateFlow,
};
use std::env;
use std::sync::Arc;

use crate::cli::{GlobalArgs, UpdateArgs};
use crate::listener::{confirm, TerminalListener};
use crate::output;
use crate::utils::Session;

pub async fn run(args: UpdateArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global).await?;
    let listener = Arc::new(TerminalListener::new(args.yes));
    let flow = session.flow(listener.clone())?;
    let artifacts = super::selected(args.artifact);

    if artifacts.contains(&ArtifactKind::Launcher) {
        let check = flow.check(ArtifactKind::Launcher).await?;
        if check.needs_update() {
            let prompt = format!(
                "Launcher {} is available (installed {}). Update now?",
                check.verdict.latest_tag.display(),
                check.verdict.installed_tag.display()
            );
            if check.verdict.mandatory || confirm(&prompt, true, args.yes) {
                // the helper finishes the job after this process exits
                return hand_off_launcher(&flow, &check, &listener).await;
            }
            output::info("Launcher update skipped");
        } else {
            output::success("Launcher is up to date");
        }
    }

    if artifacts.contains(&ArtifactKind::Client) {
        let check = flow.check(ArtifactKind::Client).await?;
        if check.needs_update() {
            let prompt = format!(
                "Client {} is available (installed {}). Update now?",
                check.verdict.latest_tag.display(),
                check.verdict.installed_tag.display()
            );
            if check.client_missing || check.verdict.mandatory || confirm(&prompt, true, args.yes) {
                update_client(&flow, &check, &listener).await?;
            } else {
                output::info("Client update skipped");
            }
        } else {
            output::success("Client is up to date");
        }
    }

    if args.launch {
        super::launch::start_client(&session)?;
    }
    Ok(())
}

async fn update_client(flow: &UpdateFlow, check: &UpdateCheck, listener: &TerminalListener) -> Result<()> {
    let prepared = flow
        .prepare(check)
        .await
        .context("Failed to download client update")?;
    listener.finish();
    report_integrity(&prepared.integrity);
    output::info(&format!("Downloaded {}", human_readable_size(prepared.bytes)));

    let tag = prepared.tag.clone();
    let summary = flow
        .apply_client(prepared)
        .await
        .context("Failed to install client update")?;
    listener.finish();

    report_extraction(&summary);
    if summary.is_clean() {
        output::success(&format!("Client updated to {}", tag.display()));
    } else {
        output::warning("Client files were only partly updated; the update will be retried next time");
    }
    Ok(())
}

/// Download, stage and start the helper that replaces this launcher
pub(crate) async fn hand_off_launcher(
    flow: &UpdateFlow,
    check: &UpdateCheck,
    listener: &TerminalListener,
) -> Result<()> {
    let prepared = flow
        .prepare(check)
        .await
        .context("Failed to download launcher update")?;
    listener.finish();
    report_integrity(&prepared.integrity);

    let running = env::current_exe().context("Failed to determine the running executable")?;
    let staged = flow
        .stage_launcher(&prepared, &running, std::process::id())
        .and_then(|handoff| flow.spawn_handoff(&handoff, &SystemProcessControl).map(|_| handoff));

    match staged {
        Ok(handoff) => {
            listener.finish();
            output::info(&format!(
                "Installing launcher {} ({} files); relaunch will restart shortly",
                prepared.tag.display(),
                handoff.extraction.copied + handoff.extraction.skipped
            ));
            Ok(())
        }
        Err(e) => {
            prepared.staging.cleanup_best_effort();
            Err(e).context("Failed to start the launcher update")
        }
    }
}

fn report_integrity(report: &IntegrityReport) {
    match (&report.expected, report.verified) {
        (Some(_), true) => output::success("Checksum verified"),
        (None, true) => output::info("No checksum published; download not verified"),
        (_, false) => output::warning("Checksum verification failed; continuing in advisory mode"),
    }
}

fn report_extraction(summary: &ExtractionSummary) {
    output::kv("Written", &summary.copied.to_string());
    output::kv("Unchanged", &summary.skipped.to_string());
    if summary.excluded > 0 {
        output::kv("Excluded", &summary.excluded.to_string());
    }
    for failure in &summary.failures {
        output::error(&format!("{}: {}", failure.entry, failure.message));
    }
}
