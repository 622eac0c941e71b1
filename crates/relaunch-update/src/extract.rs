//! Archive extraction with same-size change detection
//!
//! A file already present at the target with the same length as the archive
//! entry is treated as unchanged and left alone. This is a cheap heuristic,
//! not a content comparison. A single unreadable or unwritable entry is
//! recorded in [`ExtractionSummary::failures`] and extraction moves on; only
//! an archive that cannot be opened at all is an error.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, UpdateError};
use crate::progress::{Progress, UpdateListener};
use crate::staging::StagingArea;

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from the file name, falling back to magic bytes
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".zip") {
            return Ok(ArchiveFormat::Zip);
        }
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Ok(ArchiveFormat::TarGz);
        }

        let mut magic = [0u8; 4];
        let read = File::open(path)?.read(&mut magic)?;
        match &magic[..read] {
            [0x50, 0x4b, 0x03, 0x04] => Ok(ArchiveFormat::Zip),
            [0x1f, 0x8b, ..] => Ok(ArchiveFormat::TarGz),
            _ => Err(UpdateError::archive(format!(
                "unrecognised archive format: {}",
                path.display()
            ))),
        }
    }
}

/// One entry that could not be extracted
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntryError {
    pub entry: String,
    pub message: String,
}

/// Counts from one extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionSummary {
    pub copied: usize,
    /// Files left alone because an identical-size file was already present
    pub skipped: usize,
    /// Files matching an excluded name
    pub excluded: usize,
    pub failures: Vec<ArchiveEntryError>,
    pub bytes_total: u64,
}

impl ExtractionSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Every file entry in the archive
    pub fn total_files(&self) -> usize {
        self.copied + self.skipped + self.excluded + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum EntryOutcome {
    Copied,
    Skipped,
    Excluded,
}

/// Unpacks zip and tar.gz archives
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    excluded: Vec<String>,
}

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never write files with these names (compared case-insensitively)
    pub fn with_excluded(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded = names.into_iter().map(Into::into).collect();
        self
    }

    /// Extract into the staging area's payload directory, emptying it first
    pub fn extract_to_staging(
        &self,
        archive: &Path,
        staging: &StagingArea,
        listener: &dyn UpdateListener,
    ) -> Result<ExtractionSummary> {
        let payload = staging.reset_payload()?;
        self.extract(archive, &payload, listener)
    }

    /// Extract `archive` into `target_root`
    pub fn extract(
        &self,
        archive: &Path,
        target_root: &Path,
        listener: &dyn UpdateListener,
    ) -> Result<ExtractionSummary> {
        fs::create_dir_all(target_root)?;
        listener.on_status("Extracting files");

        let summary = match ArchiveFormat::detect(archive)? {
            ArchiveFormat::Zip => self.extract_zip(archive, target_root, listener)?,
            ArchiveFormat::TarGz => self.extract_tar_gz(archive, target_root, listener)?,
        };

        info!(
            copied = summary.copied,
            skipped = summary.skipped,
            excluded = summary.excluded,
            failed = summary.failed(),
            "Extracted {}",
            archive.display()
        );
        Ok(summary)
    }

    fn extract_zip(
        &self,
        archive: &Path,
        target_root: &Path,
        listener: &dyn UpdateListener,
    ) -> Result<ExtractionSummary> {
        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| UpdateError::archive(format!("{}: {}", archive.display(), e)))?;

        let entries_total = zip.len();
        let mut summary = ExtractionSummary::default();
        for i in 0..entries_total {
            if let Ok(entry) = zip.by_index_raw(i) {
                summary.bytes_total += entry.size();
            }
        }

        let mut bytes_done = 0u64;
        for i in 0..entries_total {
            let mut entry = match zip.by_index(i) {
                Ok(entry) => entry,
                Err(e) => {
                    record_failure(&mut summary, format!("#{}", i), e.to_string());
                    continue;
                }
            };

            let name = entry.name().to_string();
            let Some(relative) = entry.enclosed_name() else {
                record_failure(&mut summary, name, "path escapes the target directory".to_string());
                continue;
            };

            if entry.is_dir() {
                if let Err(e) = fs::create_dir_all(target_root.join(&relative)) {
                    record_failure(&mut summary, name, e.to_string());
                }
                continue;
            }

            let size = entry.size();
            let mode = entry.unix_mode();
            let outcome = self.place_entry(&mut entry, &relative, size, mode, target_root);
            tally(&mut summary, name.clone(), outcome);

            bytes_done += size;
            listener.on_progress(&Progress::Extract {
                entry: name,
                entries_done: i + 1,
                entries_total,
                bytes_done,
                bytes_total: summary.bytes_total,
            });
        }

        Ok(summary)
    }

    fn extract_tar_gz(
        &self,
        archive: &Path,
        target_root: &Path,
        listener: &dyn UpdateListener,
    ) -> Result<ExtractionSummary> {
        let (entries_total, bytes_total) = scan_tar_gz(archive)?;
        let mut summary = ExtractionSummary {
            bytes_total,
            ..ExtractionSummary::default()
        };

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
        let entries = tar
            .entries()
            .map_err(|e| UpdateError::archive(format!("{}: {}", archive.display(), e)))?;

        let mut bytes_done = 0u64;
        for (index, entry) in entries.enumerate() {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // the stream cannot be resynchronised after a bad header
                    record_failure(&mut summary, format!("#{}", index), e.to_string());
                    break;
                }
            };

            let name = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(e) => {
                    record_failure(&mut summary, format!("#{}", index), e.to_string());
                    continue;
                }
            };
            let Some(relative) = enclosed_path(&name) else {
                record_failure(&mut summary, name, "path escapes the target directory".to_string());
                continue;
            };

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                if let Err(e) = fs::create_dir_all(target_root.join(&relative)) {
                    record_failure(&mut summary, name, e.to_string());
                }
                continue;
            }
            if !entry_type.is_file() {
                debug!("Ignoring non-file entry {}", name);
                continue;
            }

            let size = entry.size();
            let mode = entry.header().mode().ok();
            let outcome = self.place_entry(&mut entry, &relative, size, mode, target_root);
            tally(&mut summary, name.clone(), outcome);

            bytes_done += size;
            listener.on_progress(&Progress::Extract {
                entry: name,
                entries_done: index + 1,
                entries_total,
                bytes_done,
                bytes_total,
            });
        }

        Ok(summary)
    }

    fn place_entry(
        &self,
        reader: &mut dyn Read,
        relative: &Path,
        size: u64,
        mode: Option<u32>,
        target_root: &Path,
    ) -> io::Result<EntryOutcome> {
        if self.is_excluded(relative) {
            return Ok(EntryOutcome::Excluded);
        }

        let target = target_root.join(relative);
        if let Ok(existing) = fs::metadata(&target) {
            if existing.is_file() && existing.len() == size {
                return Ok(EntryOutcome::Skipped);
            }
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(reader, &mut out)?;
        apply_mode(&target, mode)?;
        Ok(EntryOutcome::Copied)
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        let Some(name) = relative.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.excluded.iter().any(|ex| ex.eq_ignore_ascii_case(name))
    }
}

fn tally(summary: &mut ExtractionSummary, name: String, outcome: io::Result<EntryOutcome>) {
    match outcome {
        Ok(EntryOutcome::Copied) => summary.copied += 1,
        Ok(EntryOutcome::Skipped) => summary.skipped += 1,
        Ok(EntryOutcome::Excluded) => summary.excluded += 1,
        Err(e) => record_failure(summary, name, e.to_string()),
    }
}

fn record_failure(summary: &mut ExtractionSummary, entry: String, message: String) {
    warn!("Failed to extract {}: {}", entry, message);
    summary.failures.push(ArchiveEntryError { entry, message });
}

/// Entry count and uncompressed size of a tar.gz, for progress totals
fn scan_tar_gz(archive: &Path) -> Result<(usize, u64)> {
    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    let entries = tar
        .entries()
        .map_err(|e| UpdateError::archive(format!("{}: {}", archive.display(), e)))?;

    let mut count = 0;
    let mut bytes = 0;
    for entry in entries {
        let Ok(entry) = entry else { break };
        count += 1;
        if entry.header().entry_type().is_file() {
            bytes += entry.size();
        }
    }
    Ok((count, bytes))
}

/// `name` as a relative path that stays inside the target directory
fn enclosed_path(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!path.as_os_str().is_empty()).then_some(path)
}

#[cfg(unix)]
fn apply_mode(target: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        let mode = mode & 0o777;
        if mode != 0 {
            fs::set_permissions(target, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_target: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}
