//! Terminal presentation of engine callbacks

use dialoguer::Confirm;
use indicatif::ProgressBar;
use relaunch_update::{ApplyState, Progress, UpdateListener};
use std::path::Path;
use std::sync::Mutex;

use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Download,
    Verify,
    Extract,
    Copy,
}

/// Draws progress bars and asks before restarting
pub struct TerminalListener {
    bar: Mutex<Option<(Stage, ProgressBar)>>,
    assume_yes: bool,
    quiet: bool,
}

impl TerminalListener {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            assume_yes,
            quiet: false,
        }
    }

    /// No bars or status lines; prompts are still answered
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Finish and remove the current bar
    pub fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some((_, bar)) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, stage: Stage, length: Option<u64>, position: u64, message: Option<&str>) {
        if self.quiet {
            return;
        }
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };

        let replace = !matches!(&*slot, Some((current, _)) if *current == stage);
        if replace {
            if let Some((_, old)) = slot.take() {
                old.finish_and_clear();
            }
            let bar = match length {
                Some(len) => ProgressBar::new(len),
                None => ProgressBar::new_spinner(),
            };
            bar.set_style(match stage {
                Stage::Download | Stage::Verify | Stage::Extract => output::bytes_style(),
                Stage::Copy => output::count_style(),
            });
            *slot = Some((stage, bar));
        }

        if let Some((_, bar)) = slot.as_ref() {
            if let Some(len) = length {
                bar.set_length(len);
            }
            bar.set_position(position);
            if let Some(message) = message {
                bar.set_message(message.to_string());
            }
        }
    }
}

impl UpdateListener for TerminalListener {
    fn on_state(&self, state: ApplyState) {
        if matches!(state, ApplyState::WritingManifest | ApplyState::Done | ApplyState::Error) {
            self.finish();
        }
    }

    fn on_status(&self, message: &str) {
        if self.quiet {
            return;
        }
        match self.bar.lock() {
            Ok(slot) => match slot.as_ref() {
                Some((_, bar)) => bar.println(message),
                None => output::info(message),
            },
            Err(_) => output::info(message),
        }
    }

    fn on_progress(&self, progress: &Progress) {
        match progress {
            Progress::Download { received, total } => {
                self.with_bar(Stage::Download, *total, *received, Some("downloading"))
            }
            Progress::Verify { processed, total } => {
                self.with_bar(Stage::Verify, Some(*total), *processed, Some("verifying"))
            }
            Progress::Extract {
                entry,
                bytes_done,
                bytes_total,
                ..
            } => self.with_bar(Stage::Extract, Some(*bytes_total), *bytes_done, Some(entry.as_str())),
            Progress::Copy {
                files_done,
                files_total,
            } => self.with_bar(
                Stage::Copy,
                Some(*files_total as u64),
                *files_done as u64,
                Some("installing"),
            ),
        }
    }

    fn confirm_restart(&self) -> bool {
        self.finish();
        if self.assume_yes || !console::user_attended() {
            return true;
        }
        Confirm::new()
            .with_prompt("Update installed. Restart now?")
            .default(true)
            .interact()
            .unwrap_or(true)
    }

    fn on_relaunched(&self, executable: &Path) {
        if !self.quiet {
            output::success(&format!("Restarted {}", executable.display()));
        }
    }
}

/// Ask a yes/no question; non-interactive sessions take `default`
pub fn confirm(prompt: &str, default: bool, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    if !console::user_attended() {
        return default;
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .unwrap_or(default)
}
