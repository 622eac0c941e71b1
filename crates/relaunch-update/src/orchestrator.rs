//! Self-replacement state machine
//!
//! ```text
//! AwaitingPeerExit -> Copying -> WritingManifest -> ConfirmingRestart
//!     -> Relaunching -> CleaningUp -> Done
//! ```
//!
//! Any failure moves to `Error`. The version record is written only after
//! every staged file reached the install root, and a relaunch failure is
//! reported without undoing the copy.
//!
//! With [`ApplyStrategy::ShadowSwap`] the install root is first copied to a
//! shadow directory beside it, the payload is copied over the shadow, and
//! the two directories are exchanged with renames. The client folder and
//! any configured preserved folders are moved across the swap rather than
//! copied. If the shadow cannot be created or the platform refuses the
//! rename, the payload is copied directly over the live root instead.

use relaunch_core::retry::{RetryError, RetryExecutor, TracingObserver, TransientIoPredicate};
use relaunch_core::types::{ApplyStrategy, ArtifactKind, LauncherConfig, RetryPolicy, RuntimeConfig};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{Result, UpdateError};
use crate::lock::{InstallLock, INNER_LOCK_FILE};
use crate::process::{script_invocation, write_relaunch_script, ProcessControl, SystemProcessControl};
use crate::progress::{NoopListener, Progress, UpdateListener};
use crate::staging::StagingArea;
use crate::store::{InstalledVersionRecord, VersionStore};
use crate::version::VersionTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyState {
    AwaitingPeerExit,
    Copying,
    WritingManifest,
    ConfirmingRestart,
    Relaunching,
    CleaningUp,
    Done,
    Error,
}

impl ApplyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyState::AwaitingPeerExit => "awaiting-peer-exit",
            ApplyState::Copying => "copying",
            ApplyState::WritingManifest => "writing-manifest",
            ApplyState::ConfirmingRestart => "confirming-restart",
            ApplyState::Relaunching => "relaunching",
            ApplyState::CleaningUp => "cleaning-up",
            ApplyState::Done => "done",
            ApplyState::Error => "error",
        }
    }
}

impl fmt::Display for ApplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to apply one staged payload
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub artifact: ArtifactKind,
    /// Extracted payload
    pub source_dir: PathBuf,
    /// Live install root
    pub target_dir: PathBuf,
    /// Process that must exit before files are replaced
    pub pid: Option<u32>,
    /// Recorded as installed once the copy succeeded
    pub version_tag: Option<VersionTag>,
    pub source_url: Option<String>,
    pub checksum: Option<String>,
    /// Executable to relaunch, relative to `target_dir`
    pub executable: Option<PathBuf>,
}

impl ApplyRequest {
    pub fn new(artifact: ArtifactKind, source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact,
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            pid: None,
            version_tag: None,
            source_url: None,
            checksum: None,
            executable: None,
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_version_tag(mut self, tag: Option<VersionTag>) -> Self {
        self.version_tag = tag.filter(|t| !t.is_empty());
        self
    }

    pub fn with_source_url(mut self, url: Option<String>) -> Self {
        self.source_url = url;
        self
    }

    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }
}

/// Timings, strategy and retry budgets
#[derive(Debug, Clone)]
pub struct ApplySettings {
    pub poll_interval: Duration,
    pub peer_exit_grace: Duration,
    pub no_pid_delay: Duration,
    pub peer_exit_timeout: Duration,
    pub lock_timeout: Duration,
    pub strategy: ApplyStrategy,
    pub excluded_files: Vec<String>,
    /// Install-root subfolders moved across a shadow swap instead of copied
    pub preserved_dirs: Vec<String>,
    pub copy_policy: RetryPolicy,
    pub swap_policy: RetryPolicy,
    pub jitter: bool,
}

impl ApplySettings {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let update = &config.update;
        Self {
            poll_interval: update.peer_poll_interval(),
            peer_exit_grace: update.peer_exit_grace(),
            no_pid_delay: update.no_pid_delay(),
            peer_exit_timeout: update.peer_exit_timeout(),
            lock_timeout: update.lock_timeout(),
            strategy: update.apply_strategy,
            excluded_files: update.excluded_files.clone(),
            preserved_dirs: update.preserved_dirs.clone(),
            copy_policy: config.retry_policies.get("copy"),
            swap_policy: config.retry_policies.get("swap"),
            jitter: true,
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.excluded_files.iter().any(|ex| ex.eq_ignore_ascii_case(name)))
    }
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

/// File primitives used while copying and swapping
pub trait FileOps: Send + Sync {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

#[derive(Debug, Default)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

/// How an apply ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The new executable is running
    Relaunched { pid: u32 },
    /// Files are in place; the user chose to restart later
    RestartPending,
    /// Files are in place but neither direct start nor the script worked
    RelaunchFailed { message: String },
    /// Files are in place and there was nothing to relaunch
    Applied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    /// Strategy that actually placed the files
    pub strategy: ApplyStrategy,
    pub files_copied: usize,
    pub transitions: Vec<ApplyState>,
}

/// Drives one apply from peer exit to cleanup
pub struct SelfReplaceOrchestrator {
    settings: ApplySettings,
    store: Arc<dyn VersionStore>,
    process: Arc<dyn ProcessControl>,
    files: Arc<dyn FileOps>,
    listener: Arc<dyn UpdateListener>,
}

impl SelfReplaceOrchestrator {
    pub fn new(settings: ApplySettings, store: Arc<dyn VersionStore>) -> Self {
        Self {
            settings,
            store,
            process: Arc::new(SystemProcessControl),
            files: Arc::new(StdFileOps),
            listener: Arc::new(NoopListener),
        }
    }

    pub fn with_process_control(mut self, process: Arc<dyn ProcessControl>) -> Self {
        self.process = process;
        self
    }

    pub fn with_file_ops(mut self, files: Arc<dyn FileOps>) -> Self {
        self.files = files;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn UpdateListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn settings(&self) -> &ApplySettings {
        &self.settings
    }

    /// Run the state machine to completion
    pub async fn run(&self, request: &ApplyRequest) -> Result<ApplyReport> {
        let mut transitions = Vec::new();
        match self.run_states(request, &mut transitions).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.enter(ApplyState::Error, &mut transitions);
                error!(artifact = %request.artifact, "Apply failed: {}", e);
                self.listener.on_status(&format!("Update failed: {}", e));
                Err(e)
            }
        }
    }

    async fn run_states(&self, request: &ApplyRequest, transitions: &mut Vec<ApplyState>) -> Result<ApplyReport> {
        self.enter(ApplyState::AwaitingPeerExit, transitions);
        self.await_peer_exit(request.pid).await?;

        let lock = InstallLock::acquire(&request.target_dir, self.settings.lock_timeout).await?;

        self.enter(ApplyState::Copying, transitions);
        let (strategy, files_copied) = self.copy_payload(request).await?;

        self.enter(ApplyState::WritingManifest, transitions);
        self.write_manifest(request)?;
        drop(lock);

        self.enter(ApplyState::ConfirmingRestart, transitions);
        let outcome = match &request.executable {
            None => ApplyOutcome::Applied,
            Some(_) if !self.listener.confirm_restart() => {
                info!("Restart declined; update applied and pending restart");
                ApplyOutcome::RestartPending
            }
            Some(executable) => {
                self.enter(ApplyState::Relaunching, transitions);
                self.relaunch(&request.target_dir, executable)
            }
        };

        self.enter(ApplyState::CleaningUp, transitions);
        self.clean_up(&request.source_dir);

        self.enter(ApplyState::Done, transitions);
        Ok(ApplyReport {
            outcome,
            strategy,
            files_copied,
            transitions: transitions.clone(),
        })
    }

    fn enter(&self, state: ApplyState, transitions: &mut Vec<ApplyState>) {
        info!(state = %state, "Apply state");
        transitions.push(state);
        self.listener.on_state(state);
    }

    async fn await_peer_exit(&self, pid: Option<u32>) -> Result<()> {
        let Some(pid) = pid else {
            tokio::time::sleep(self.settings.no_pid_delay).await;
            return Ok(());
        };

        self.listener.on_status(&format!("Waiting for process {} to exit", pid));
        let start = Instant::now();
        while self.process.is_running(pid) {
            let waited = start.elapsed();
            if waited >= self.settings.peer_exit_timeout {
                return Err(UpdateError::PeerExitTimeout { pid, waited });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        debug!(pid, "Peer exited, waiting for file handles to close");
        tokio::time::sleep(self.settings.peer_exit_grace).await;
        Ok(())
    }

    async fn copy_payload(&self, request: &ApplyRequest) -> Result<(ApplyStrategy, usize)> {
        let source = &request.source_dir;
        if !source.is_dir() {
            return Err(UpdateError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("payload directory {} does not exist", source.display()),
            )));
        }

        let payload = self.payload_files(source);
        self.listener.on_status(&format!("Installing {} files", payload.len()));

        if self.settings.strategy == ApplyStrategy::ShadowSwap {
            let preserved = self.preserved_entries(request);
            match self.shadow_swap(&payload, &request.target_dir, &preserved).await {
                Ok(copied) => return Ok((ApplyStrategy::ShadowSwap, copied)),
                Err(SwapError::Refused(e)) => {
                    warn!("Directory swap unavailable ({}), overwriting in place", e);
                }
                Err(SwapError::Fatal(e)) => return Err(e),
            }
        }

        let copied = self.copy_files(&payload, &request.target_dir, true).await?;
        Ok((ApplyStrategy::DirectOverwrite, copied))
    }

    /// Existing entries of the install root that a shadow swap carries over
    ///
    /// Nested entries collapse into their outermost preserved ancestor.
    fn preserved_entries(&self, request: &ApplyRequest) -> Vec<PathBuf> {
        let target = &request.target_dir;
        let mut candidates: Vec<PathBuf> = self.settings.preserved_dirs.iter().map(PathBuf::from).collect();
        if request.artifact == ArtifactKind::Launcher {
            let client_root = LauncherConfig::load_local_or_default(target).client_root(target);
            if let Ok(relative) = client_root.strip_prefix(target) {
                candidates.push(relative.to_path_buf());
            }
        }

        candidates.sort();
        let mut entries: Vec<PathBuf> = Vec::new();
        for candidate in candidates {
            if !is_plain_relative(&candidate) || !target.join(&candidate).exists() {
                continue;
            }
            if entries.iter().any(|kept| candidate.starts_with(kept)) {
                continue;
            }
            entries.push(candidate);
        }
        entries
    }

    /// (absolute, relative) paths of every payload file to install
    fn payload_files(&self, source: &Path) -> Vec<(PathBuf, PathBuf)> {
        WalkDir::new(source)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(source).ok()?.to_path_buf();
                if self.settings.is_excluded(&relative) {
                    debug!("Not installing excluded file {}", relative.display());
                    return None;
                }
                Some((entry.path().to_path_buf(), relative))
            })
            .collect()
    }

    async fn copy_files(&self, files: &[(PathBuf, PathBuf)], target_root: &Path, report: bool) -> Result<usize> {
        let total = files.len();
        for (index, (from, relative)) in files.iter().enumerate() {
            let to = target_root.join(relative);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            self.copy_with_retry(from, &to).await?;

            if report {
                self.listener.on_progress(&Progress::Copy {
                    files_done: index + 1,
                    files_total: total,
                });
            }
        }
        Ok(total)
    }

    async fn copy_with_retry(&self, from: &Path, to: &Path) -> Result<()> {
        let executor = RetryExecutor::new(self.settings.copy_policy.clone())
            .with_predicate(TransientIoPredicate)
            .with_observer(TracingObserver::new("copy"))
            .with_jitter(self.settings.jitter);

        let result = executor
            .execute(|| {
                let attempt = self.files.copy_file(from, to);
                async move { attempt }
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => Err(file_lock_error(to, err)),
        }
    }

    async fn rename_with_retry(&self, from: &Path, to: &Path) -> io::Result<()> {
        let executor = RetryExecutor::new(self.settings.swap_policy.clone())
            .with_predicate(TransientIoPredicate)
            .with_observer(TracingObserver::new("swap"))
            .with_jitter(self.settings.jitter);

        executor
            .execute(|| {
                let attempt = self.files.rename(from, to);
                async move { attempt }
            })
            .await
            .map_err(|err| match err.into_source() {
                Some(source) => source,
                None => io::Error::other("rename was not attempted"),
            })
    }

    async fn shadow_swap(
        &self,
        payload: &[(PathBuf, PathBuf)],
        target: &Path,
        preserved: &[PathBuf],
    ) -> std::result::Result<usize, SwapError> {
        let (Some(parent), Some(name)) = (
            target.parent().filter(|p| !p.as_os_str().is_empty()),
            target.file_name().map(|n| n.to_string_lossy().into_owned()),
        ) else {
            return Err(SwapError::Refused(io::Error::other("install root has no parent directory")));
        };

        let suffix = Uuid::new_v4().simple().to_string();
        let shadow = parent.join(format!(".{}.shadow-{}", name, suffix));
        let old = parent.join(format!(".{}.old-{}", name, suffix));

        if let Err(e) = self.files.create_dir_all(&shadow) {
            remove_tree_best_effort(&shadow);
            return Err(SwapError::Refused(e));
        }

        // Payload files inside a preserved folder go straight to the live tree
        let (deferred, staged): (Vec<_>, Vec<_>) = payload
            .iter()
            .cloned()
            .partition(|(_, relative)| preserved.iter().any(|kept| relative.starts_with(kept)));

        let copied = match self.build_shadow(&staged, target, &shadow, preserved).await {
            Ok(copied) => copied,
            Err(e) => {
                remove_tree_best_effort(&shadow);
                return Err(SwapError::Fatal(e));
            }
        };

        if !target.exists() {
            return match self.rename_with_retry(&shadow, target).await {
                Ok(()) => Ok(copied),
                Err(e) => {
                    remove_tree_best_effort(&shadow);
                    Err(SwapError::Refused(e))
                }
            };
        }

        if let Err(e) = self.rename_with_retry(target, &old).await {
            remove_tree_best_effort(&shadow);
            return Err(SwapError::Refused(e));
        }

        if let Err(e) = self.move_entries(preserved, &old, &shadow).await {
            warn!("Could not carry preserved folders into shadow ({}), restoring previous install", e);
            self.restore_previous(&old, target)?;
            remove_tree_best_effort(&shadow);
            return Err(SwapError::Refused(e));
        }

        if let Err(e) = self.rename_with_retry(&shadow, target).await {
            warn!("Could not move shadow into place ({}), restoring previous install", e);
            if let Err(back) = self.move_entries(preserved, &shadow, &old).await {
                error!("Could not return preserved folders to {}: {}", old.display(), back);
            }
            self.restore_previous(&old, target)?;
            remove_tree_best_effort(&shadow);
            return Err(SwapError::Refused(e));
        }

        remove_tree_best_effort(&old);
        info!("Swapped {} into place", target.display());

        let direct = self
            .copy_files(&deferred, target, true)
            .await
            .map_err(SwapError::Fatal)?;
        Ok(copied + direct)
    }

    fn restore_previous(&self, old: &Path, target: &Path) -> std::result::Result<(), SwapError> {
        self.files.rename(old, target).map_err(|restore| {
            error!(
                "Could not restore {} from {}: {}",
                target.display(),
                old.display(),
                restore
            );
            SwapError::Fatal(UpdateError::Io(restore))
        })
    }

    /// Rename each relative entry from one root to the other, undoing on failure
    async fn move_entries(&self, entries: &[PathBuf], from: &Path, to: &Path) -> io::Result<()> {
        for (index, relative) in entries.iter().enumerate() {
            let source = from.join(relative);
            if !source.exists() {
                continue;
            }
            let destination = to.join(relative);
            let prepared = match destination.parent() {
                Some(parent) => fs::create_dir_all(parent),
                None => Ok(()),
            };
            let moved = match prepared {
                Ok(()) => self.rename_with_retry(&source, &destination).await,
                Err(e) => Err(e),
            };

            if let Err(e) = moved {
                for done in entries[..index].iter().rev() {
                    let (back_from, back_to) = (to.join(done), from.join(done));
                    if back_from.exists() {
                        if let Err(back) = self.files.rename(&back_from, &back_to) {
                            error!("Could not move {} back: {}", back_from.display(), back);
                        }
                    }
                }
                return Err(e);
            }
            debug!("Carried {} across the swap", relative.display());
        }
        Ok(())
    }

    async fn build_shadow(
        &self,
        payload: &[(PathBuf, PathBuf)],
        target: &Path,
        shadow: &Path,
        preserved: &[PathBuf],
    ) -> Result<usize> {
        if target.is_dir() {
            let existing: Vec<(PathBuf, PathBuf)> = WalkDir::new(target)
                .into_iter()
                .filter_entry(|entry| {
                    entry
                        .path()
                        .strip_prefix(target)
                        .map_or(true, |relative| !is_carried_over(relative, preserved))
                })
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    let relative = entry.path().strip_prefix(target).ok()?.to_path_buf();
                    Some((entry.path().to_path_buf(), relative))
                })
                .collect();

            let mut files = Vec::new();
            for (path, relative) in existing {
                if path.is_dir() {
                    fs::create_dir_all(shadow.join(&relative))?;
                } else if path.is_file() {
                    files.push((path, relative));
                }
            }
            debug!("Copying {} existing files into shadow", files.len());
            self.copy_files(&files, shadow, false).await?;
        }

        self.copy_files(payload, shadow, true).await
    }

    fn write_manifest(&self, request: &ApplyRequest) -> Result<()> {
        let Some(tag) = &request.version_tag else {
            warn!("No version tag supplied, leaving the version record unchanged");
            return Ok(());
        };

        let record = InstalledVersionRecord::new(tag.clone())
            .with_source_url(request.source_url.clone())
            .with_checksum(request.checksum.clone());
        self.store.write(request.artifact, &record)?;

        if request.artifact == ArtifactKind::Launcher {
            match LauncherConfig::stamp_launcher_version(&request.target_dir, tag.as_str()) {
                Ok(true) => debug!("Stamped launcher version {} into config", tag),
                Ok(false) => {}
                Err(e) => warn!("Could not stamp launcher version into config: {}", e),
            }
        }
        Ok(())
    }

    fn relaunch(&self, target_dir: &Path, executable: &Path) -> ApplyOutcome {
        let exe_path = target_dir.join(executable);
        self.listener.on_status("Restarting");

        let direct = match self.process.spawn(&exe_path, &[], target_dir) {
            Ok(pid) => {
                info!(pid, "Relaunched {}", exe_path.display());
                self.listener.on_relaunched(&exe_path);
                return ApplyOutcome::Relaunched { pid };
            }
            Err(e) => e,
        };
        warn!("Direct relaunch of {} failed: {}", exe_path.display(), direct);

        let scripted = write_relaunch_script(target_dir, &exe_path).and_then(|script| {
            let (program, args) = script_invocation(&script);
            self.process.spawn(&program, &args, target_dir)
        });

        match scripted {
            Ok(pid) => {
                info!(pid, "Relaunched {} through script", exe_path.display());
                self.listener.on_relaunched(&exe_path);
                ApplyOutcome::Relaunched { pid }
            }
            Err(e) => {
                let message = format!("direct start failed ({}), script failed ({})", direct, e);
                error!("Relaunch failed: {}", message);
                self.listener.on_status("Update installed, but the application could not be restarted");
                ApplyOutcome::RelaunchFailed { message }
            }
        }
    }

    fn clean_up(&self, source_dir: &Path) {
        match StagingArea::from_payload(source_dir) {
            Some(staging) => staging.cleanup_best_effort(),
            None => debug!(
                "{} is not a staging payload, leaving it in place",
                source_dir.display()
            ),
        }
    }
}

enum SwapError {
    /// The swap could not be performed; the live root is untouched
    Refused(io::Error),
    Fatal(UpdateError),
}

fn file_lock_error(path: &Path, err: RetryError<io::Error>) -> UpdateError {
    let attempts = err.attempts();
    match err.into_source() {
        Some(source) => UpdateError::FileLock {
            path: path.to_path_buf(),
            attempts,
            source,
        },
        None => UpdateError::Io(io::Error::other(format!(
            "copy to {} was not attempted",
            path.display()
        ))),
    }
}

/// Entries a shadow build skips: preserved folders and the in-root lock
fn is_carried_over(relative: &Path, preserved: &[PathBuf]) -> bool {
    relative == Path::new(INNER_LOCK_FILE) || preserved.iter().any(|kept| relative.starts_with(kept))
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn remove_tree_best_effort(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(path) {
        warn!("Could not remove {}: {}", path.display(), e);
    }
}
