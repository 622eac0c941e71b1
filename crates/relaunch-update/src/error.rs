//! Error taxonomy for update attempts
//!
//! Network failures while *checking* never reach callers as errors (the
//! release client degrades to an empty descriptor). Everything here is fatal
//! to the attempt that produced it and leaves the installed version record
//! untouched.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use relaunch_core::retry::{HttpStatusError, RetryError};

pub type Result<T> = std::result::Result<T, UpdateError>;

#[derive(Error, Debug)]
pub enum UpdateError {
    /// Transport-level failure talking to a release host
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Downloaded artifact does not match its published digest
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// The published checksum could not be fetched or contained no digest
    #[error("Checksum reference unusable: {0}")]
    ChecksumReference(String),

    /// A target file stayed locked through every copy attempt
    #[error("Could not replace {} after {attempts} attempts: {source}", .path.display())]
    FileLock {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The archive itself could not be opened or read
    #[error("Archive error: {0}")]
    Archive(String),

    /// Neither direct start nor the relaunch script worked
    #[error("Relaunch failed: {0}")]
    Launch(String),

    /// The process being replaced did not exit in time
    #[error("Process {pid} still running after {}s", .waited.as_secs())]
    PeerExitTimeout { pid: u32, waited: Duration },

    /// Another update holds the install lock
    #[error("Another update is in progress for {}", .root.display())]
    Busy { root: PathBuf },

    /// The version record could not be read or written
    #[error("Version record error: {0}")]
    Manifest(String),

    /// No usable release asset or download URL
    #[error("Release has no downloadable asset: {0}")]
    NoAsset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] relaunch_core::Error),
}

impl UpdateError {
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest(message.into())
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch(message.into())
    }

    /// Network and HTTP failures; used to phrase user-facing messages
    pub fn is_network(&self) -> bool {
        matches!(self, UpdateError::Network(_) | UpdateError::Http { .. })
    }
}

impl HttpStatusError for UpdateError {
    fn status_code(&self) -> Option<u16> {
        match self {
            UpdateError::Http { status, .. } => Some(*status),
            UpdateError::Network(e) => e.status().map(|s| s.as_u16()),
            // local disk problems will not improve by downloading again
            UpdateError::Io(_) => Some(0),
            _ => None,
        }
    }
}

impl From<RetryError<UpdateError>> for UpdateError {
    fn from(err: RetryError<UpdateError>) -> Self {
        match err {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => source,
            RetryError::NoAttempts => {
                UpdateError::Io(std::io::Error::other("retry policy allows no attempts"))
            }
        }
    }
}
