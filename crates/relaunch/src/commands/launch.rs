//! Launch command

use anyhow::{bail, Context, Result};
use relaunch_core::types::ArtifactKind;
use relaunch_update::{NoopListener, ProcessControl, SystemProcessControl};
use std::sync::Arc;

use crate::cli::{GlobalArgs, LaunchArgs};
use crate::output;
use crate::utils::Session;

pub async fn run(args: LaunchArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global).await?;

    if !args.force {
        let flow = session.flow(Arc::new(NoopListener))?;
        let check = flow.check(ArtifactKind::Client).await?;
        if check.client_missing {
            bail!("Client is not installed; run 'relaunch update' first");
        }
        if check.verdict.mandatory {
            bail!(
                "Client {} is older than the required version; run 'relaunch update' first",
                check.verdict.installed_tag.display()
            );
        }
    }

    start_client(&session)
}

/// Start `<clientFolder>/bin/<clientExecutable>` from the client folder
pub(crate) fn start_client(session: &Session) -> Result<()> {
    let executable = session.launcher_config.client_launch_path(&session.launcher_root);
    if !executable.is_file() {
        bail!("Client executable not found at {}", executable.display());
    }
    let client_root = session.launcher_config.client_root(&session.launcher_root);

    let pid = SystemProcessControl
        .spawn(&executable, &[], &client_root)
        .with_context(|| format!("Failed to start {}", executable.display()))?;
    output::success(&format!("Started {} (pid {})", executable.display(), pid));
    Ok(())
}
