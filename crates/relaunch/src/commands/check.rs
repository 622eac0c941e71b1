//! Check command

use anyhow::Result;
use relaunch_core::utils::human_readable_size;
use relaunch_update::{NoopListener, UpdateCheck};
use serde_json::json;
use std::sync::Arc;

use crate::cli::{CheckArgs, GlobalArgs};
use crate::output;
use crate::utils::Session;

pub async fn run(args: CheckArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global).await?;
    let flow = session.flow(Arc::new(NoopListener))?;

    let mut checks = Vec::new();
    let spinner = (!args.json).then(|| output::spinner("Checking for updates..."));
    for artifact in super::selected(args.artifact) {
        checks.push(flow.check(artifact).await?);
    }
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if args.json {
        let report: Vec<_> = checks.iter().map(check_json).collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for check in &checks {
        print_check(check);
    }
    Ok(())
}

fn check_json(check: &UpdateCheck) -> serde_json::Value {
    let verdict = &check.verdict;
    json!({
        "artifact": check.artifact,
        "installed": verdict.installed_tag.as_str(),
        "latest": verdict.latest_tag.as_str(),
        "hasUpdate": check.needs_update(),
        "mandatory": verdict.mandatory,
        "clientMissing": check.client_missing,
        "assetUrl": verdict.asset_url,
        "assetSize": verdict.asset_size,
    })
}

fn print_check(check: &UpdateCheck) {
    let verdict = &check.verdict;
    output::header(&format!("{}", check.artifact));

    let installed = if verdict.installed_tag.is_empty() {
        "not installed".to_string()
    } else {
        verdict.installed_tag.display()
    };
    output::kv("Installed", &installed);

    let latest = if verdict.latest_tag.is_empty() {
        "unknown".to_string()
    } else {
        verdict.latest_tag.display()
    };
    output::kv("Latest", &latest);

    if let Some(size) = verdict.asset_size {
        output::kv("Download", &human_readable_size(size));
    }

    if check.client_missing {
        output::warning("Client is not installed; run 'relaunch update' to download it");
    } else if verdict.mandatory {
        output::warning(&format!(
            "Update to {} is required before launching",
            verdict.latest_tag.display()
        ));
    } else if verdict.has_update {
        output::info(&format!("Update available: {}", verdict.latest_tag.display()));
    } else {
        output::success("Up to date");
    }
}
