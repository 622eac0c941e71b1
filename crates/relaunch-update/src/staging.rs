//! Per-attempt staging directories
//!
//! Each update attempt owns one directory under the staging root holding the
//! downloaded archive, the extracted payload and (for launcher updates) the
//! helper executable. A marker file identifies directories created here, so
//! a helper process only ever deletes a tree it can prove is a staging area.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const MARKER_FILE: &str = ".relaunch-staging";
const PAYLOAD_DIR: &str = "payload";

#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Create a fresh, uniquely named staging area under `base`
    pub fn create(base: &Path) -> io::Result<Self> {
        let root = base.join(format!("attempt-{}", Uuid::new_v4()));
        fs::create_dir_all(root.join(PAYLOAD_DIR))?;
        fs::write(root.join(MARKER_FILE), b"")?;
        debug!("Created staging area at {}", root.display());
        Ok(Self { root })
    }

    /// The staging area that owns `payload_dir`, if it was created by
    /// [`StagingArea::create`]
    pub fn from_payload(payload_dir: &Path) -> Option<Self> {
        let root = payload_dir.parent()?;
        if payload_dir.file_name()? == PAYLOAD_DIR && root.join(MARKER_FILE).is_file() {
            Some(Self {
                root: root.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a downloaded file named `name` is kept
    pub fn archive_path(&self, name: &str) -> PathBuf {
        let file_name = Path::new(name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("artifact"));
        self.root.join(file_name)
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.root.join(PAYLOAD_DIR)
    }

    /// Empty the payload directory and return its path
    pub fn reset_payload(&self) -> io::Result<PathBuf> {
        let payload = self.payload_dir();
        match fs::remove_dir_all(&payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::create_dir_all(&payload)?;
        Ok(payload)
    }

    /// Delete the whole staging tree
    pub fn cleanup(self) -> io::Result<()> {
        debug!("Removing staging area {}", self.root.display());
        fs::remove_dir_all(&self.root)
    }

    /// Delete the staging tree, logging instead of failing
    pub fn cleanup_best_effort(self) {
        let root = self.root.clone();
        if let Err(e) = self.cleanup() {
            warn!("Could not remove staging area {}: {}", root.display(), e);
        }
    }
}
