//! Cross-process exclusion for one install root
//!
//! The lock file sits beside the install root rather than inside it so that
//! a shadow swap can rename the root while the lock is held. When the parent
//! directory is not writable the lock falls back to a file inside the root.

use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Result, UpdateError};

const STARTING_BACKOFF_DELAY_MS: u64 = 10;
const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Lock file name used inside the install root when its parent is read-only
pub const INNER_LOCK_FILE: &str = ".relaunch.lock";

/// Held for as long as an attempt touches the install tree
#[derive(Debug)]
pub struct InstallLock {
    /// The lock is released when this handle is dropped
    _file: Arc<File>,
    path: PathBuf,
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        debug!("Released install lock {}", self.path.display());
    }
}

impl InstallLock {
    /// `.<root-name>.relaunch.lock` in the parent of `install_root`
    pub fn lock_path(install_root: &Path) -> PathBuf {
        let name = install_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "install".to_string());
        let parent = install_root
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{}.relaunch.lock", name))
    }

    /// Take the lock, polling with backoff for up to `timeout`
    ///
    /// Fails with [`UpdateError::Busy`] when another process keeps holding it.
    pub async fn acquire(install_root: &Path, timeout: Duration) -> Result<Self> {
        let beside = Self::lock_path(install_root);
        let (file, path) = match open_lock_file(&beside).await {
            Ok(file) => (file, beside),
            Err(e) => {
                let inner = install_root.join(INNER_LOCK_FILE);
                warn!(
                    "Cannot create lock beside {} ({}), using {}",
                    install_root.display(),
                    e,
                    inner.display()
                );
                let file = open_lock_file(&inner).await?;
                (file, inner)
            }
        };
        let file = Arc::new(file);

        let start = Instant::now();
        let mut delay = Duration::from_millis(STARTING_BACKOFF_DELAY_MS);
        loop {
            let candidate = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || candidate.try_lock_exclusive())
                .await
                .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?;

            if let Ok(true) = locked {
                debug!(
                    wait_ms = start.elapsed().as_millis() as u64,
                    "Acquired install lock {}",
                    path.display()
                );
                return Ok(Self { _file: file, path });
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(UpdateError::Busy {
                    root: install_root.to_path_buf(),
                });
            }
            tokio::time::sleep(delay.min(remaining)).await;
            delay = (delay * 2).min(Duration::from_millis(MAX_BACKOFF_DELAY_MS));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn open_lock_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let open_path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&open_path)
    })
    .await
    .map_err(std::io::Error::other)?
}
