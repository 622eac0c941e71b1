//! Test doubles for listener, process and file seams

use relaunch_update::orchestrator::{ApplyState, FileOps};
use relaunch_update::process::ProcessControl;
use relaunch_update::progress::{Progress, UpdateListener};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Records every callback
pub struct RecordingListener {
    pub states: Mutex<Vec<ApplyState>>,
    pub statuses: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<Progress>>,
    pub relaunched: Mutex<Vec<PathBuf>>,
    confirm: bool,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::confirming(true)
    }

    pub fn confirming(confirm: bool) -> Self {
        Self {
            states: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            relaunched: Mutex::new(Vec::new()),
            confirm,
        }
    }

    pub fn states(&self) -> Vec<ApplyState> {
        self.states.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<Progress> {
        self.progress.lock().unwrap().clone()
    }

    pub fn relaunched(&self) -> Vec<PathBuf> {
        self.relaunched.lock().unwrap().clone()
    }
}

impl UpdateListener for RecordingListener {
    fn on_state(&self, state: ApplyState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn on_progress(&self, progress: &Progress) {
        self.progress.lock().unwrap().push(progress.clone());
    }

    fn confirm_restart(&self) -> bool {
        self.confirm
    }

    fn on_relaunched(&self, executable: &Path) {
        self.relaunched.lock().unwrap().push(executable.to_path_buf());
    }
}

/// Peer that stays alive for a number of polls; spawns are recorded
pub struct FakeProcessControl {
    alive_polls: AtomicU32,
    fail_direct: bool,
    fail_script: bool,
    pub spawned: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeProcessControl {
    pub fn new() -> Self {
        Self::alive_for(0)
    }

    /// `is_running` answers true this many times
    pub fn alive_for(polls: u32) -> Self {
        Self {
            alive_polls: AtomicU32::new(polls),
            fail_direct: false,
            fail_script: false,
            spawned: Mutex::new(Vec::new()),
        }
    }

    /// A peer that never exits
    pub fn never_exits() -> Self {
        Self::alive_for(u32::MAX)
    }

    pub fn failing_direct_start(mut self) -> Self {
        self.fail_direct = true;
        self
    }

    pub fn failing_script(mut self) -> Self {
        self.fail_script = true;
        self
    }

    pub fn spawned(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.spawned.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeProcessControl {
    fn is_running(&self, _pid: u32) -> bool {
        self.alive_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn spawn(&self, program: &Path, args: &[String], _cwd: &Path) -> io::Result<u32> {
        self.spawned
            .lock()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));

        let is_script = args.iter().any(|a| a.contains("restart_launcher"));
        if (is_script && self.fail_script) || (!is_script && self.fail_direct) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "start refused"));
        }
        Ok(4242)
    }
}

/// Copies normally, except that one file name stays locked for a while
pub struct FlakyFileOps {
    locked_name: String,
    locked_attempts: u32,
    refuse_renames: bool,
    refuse_shadow: bool,
    attempts: Mutex<HashMap<PathBuf, u32>>,
}

impl FlakyFileOps {
    /// Copies to `name` fail with a sharing violation `locked_attempts` times
    pub fn locked(name: &str, locked_attempts: u32) -> Self {
        Self {
            locked_name: name.to_string(),
            locked_attempts,
            refuse_renames: false,
            refuse_shadow: false,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Directory renames are not supported
    pub fn refusing_renames() -> Self {
        Self {
            locked_name: String::new(),
            locked_attempts: 0,
            refuse_renames: true,
            refuse_shadow: false,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Plain file operations that only count copies
    pub fn counting() -> Self {
        Self::locked("", 0)
    }

    /// Creating the shadow directory beside the install root fails
    pub fn refusing_shadow() -> Self {
        Self {
            refuse_shadow: true,
            ..Self::counting()
        }
    }

    /// Copy attempts made to any file under `dir`
    pub fn copies_under(&self, dir: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.components().any(|c| c.as_os_str() == dir))
            .map(|(_, count)| *count)
            .sum()
    }

    /// Copy attempts made to files named `name`
    pub fn attempts_for(&self, name: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.file_name().is_some_and(|n| n == name))
            .map(|(_, count)| *count)
            .sum()
    }
}

impl FileOps for FlakyFileOps {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(to.to_path_buf()).or_insert(0);
            *count += 1;
            *count
        };

        let is_locked_file = to.file_name().is_some_and(|n| n == self.locked_name.as_str());
        if is_locked_file && attempt <= self.locked_attempts {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "the process cannot access the file because it is being used by another process",
            ));
        }
        fs::copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.refuse_renames {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "rename not supported"));
        }
        fs::rename(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let is_shadow = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().contains(".shadow-"));
        if self.refuse_shadow && is_shadow {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "parent directory is read-only"));
        }
        fs::create_dir_all(path)
    }
}
