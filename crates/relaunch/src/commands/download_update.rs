//! Download-update command
//!
//! Non-interactive re-entry point: installs one specific launcher build
//! without consulting the release host.

use anyhow::{bail, Result};
use relaunch_core::types::ArtifactKind;
use relaunch_update::{UpdateCheck, VersionTag};
use std::sync::Arc;

use crate::cli::{DownloadUpdateArgs, GlobalArgs};
use crate::listener::TerminalListener;
use crate::utils::Session;

pub async fn run(args: DownloadUpdateArgs, global: &GlobalArgs) -> Result<()> {
    if args.url.trim().is_empty() {
        bail!("--url must not be empty");
    }

    let session = Session::open(global).await?;
    let listener = Arc::new(TerminalListener::new(true));
    let flow = session.flow(listener.clone())?;

    let check = UpdateCheck::direct(
        ArtifactKind::Launcher,
        args.url,
        VersionTag::parse(&args.version),
        args.api_url.filter(|u| !u.trim().is_empty()),
        args.checksum_url.filter(|u| !u.trim().is_empty()),
    );

    super::update::hand_off_launcher(&flow, &check, &listener).await
}
