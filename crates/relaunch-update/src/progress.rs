//! Callbacks into the presentation layer
//!
//! The engine never draws anything. It reports states, status lines and
//! progress to an [`UpdateListener`] and asks it whether to restart.

use std::path::Path;
use std::sync::Arc;

use crate::orchestrator::ApplyState;

/// Progress of one I/O-bound stage
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// `total` is `None` when the server sent no content length
    Download { received: u64, total: Option<u64> },
    Verify { processed: u64, total: u64 },
    Extract {
        entry: String,
        entries_done: usize,
        entries_total: usize,
        bytes_done: u64,
        bytes_total: u64,
    },
    Copy { files_done: usize, files_total: usize },
}

impl Progress {
    /// Completion in percent, when the total is known
    pub fn percent(&self) -> Option<f64> {
        let (done, total) = match self {
            Progress::Download { received, total } => (*received, (*total)?),
            Progress::Verify { processed, total } => (*processed, *total),
            Progress::Extract {
                bytes_done,
                bytes_total,
                ..
            } => (*bytes_done, *bytes_total),
            Progress::Copy {
                files_done,
                files_total,
            } => (*files_done as u64, *files_total as u64),
        };

        if total == 0 {
            return None;
        }
        Some((done as f64 / total as f64 * 100.0).min(100.0))
    }
}

/// Receives everything the engine wants to tell the user
///
/// Every method has a default so listeners implement only what they show.
pub trait UpdateListener: Send + Sync {
    fn on_state(&self, _state: ApplyState) {}

    fn on_status(&self, _message: &str) {}

    fn on_progress(&self, _progress: &Progress) {}

    /// Asked once after files are in place; `false` leaves the restart pending
    fn confirm_restart(&self) -> bool {
        true
    }

    /// Called once after the new executable was started
    fn on_relaunched(&self, _executable: &Path) {}
}

/// Ignores everything and always confirms restarts
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl UpdateListener for NoopListener {}

impl<T: UpdateListener + ?Sized> UpdateListener for Arc<T> {
    fn on_state(&self, state: ApplyState) {
        (**self).on_state(state)
    }

    fn on_status(&self, message: &str) {
        (**self).on_status(message)
    }

    fn on_progress(&self, progress: &Progress) {
        (**self).on_progress(progress)
    }

    fn confirm_restart(&self) -> bool {
        (**self).confirm_restart()
    }

    fn on_relaunched(&self, executable: &Path) {
        (**self).on_relaunched(executable)
    }
}
