//! Process liveness and process start
//!
//! The orchestrator only needs two primitives from the OS. They sit behind
//! [`ProcessControl`] so state-machine tests run without real processes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::debug;

pub trait ProcessControl: Send + Sync {
    /// Whether a live process with `pid` exists
    fn is_running(&self, pid: u32) -> bool;

    /// Start `program` detached with `cwd` as working directory, returning
    /// the new PID
    fn spawn(&self, program: &Path, args: &[String], cwd: &Path) -> io::Result<u32>;
}

/// Real processes via `sysinfo` and `std::process`
#[derive(Debug, Default)]
pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl {
    fn is_running(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        match system.process(pid) {
            Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
            None => false,
        }
    }

    fn spawn(&self, program: &Path, args: &[String], cwd: &Path) -> io::Result<u32> {
        debug!("Starting {} {:?} in {}", program.display(), args, cwd.display());
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(child.id())
    }
}

/// Name of the fallback relaunch script for this platform
pub fn relaunch_script_name() -> &'static str {
    if cfg!(windows) {
        "restart_launcher.bat"
    } else {
        "restart_launcher.sh"
    }
}

/// Write a minimal script into `install_root` that starts `executable`
pub fn write_relaunch_script(install_root: &Path, executable: &Path) -> io::Result<PathBuf> {
    let script_path = install_root.join(relaunch_script_name());
    let exe_name = executable
        .strip_prefix(install_root)
        .unwrap_or(executable)
        .to_string_lossy()
        .into_owned();

    let contents = if cfg!(windows) {
        format!(
            "@echo off\r\ncd /d \"{}\"\r\nstart \"\" \"{}\"\r\n",
            install_root.display(),
            exe_name
        )
    } else {
        format!(
            "#!/bin/sh\ncd \"{}\" || exit 1\nexec \"./{}\"\n",
            install_root.display(),
            exe_name
        )
    };
    fs::write(&script_path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(script_path)
}

/// Interpreter and arguments that run `script`
pub fn script_invocation(script: &Path) -> (PathBuf, Vec<String>) {
    let script = script.to_string_lossy().into_owned();
    if cfg!(windows) {
        (PathBuf::from("cmd"), vec!["/C".to_string(), script])
    } else {
        (PathBuf::from("sh"), vec![script])
    }
}
