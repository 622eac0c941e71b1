//! Archives and install layouts on disk

use relaunch_core::types::{RetryPolicy, RetryStrategy, RuntimeConfig};
use relaunch_update::orchestrator::ApplySettings;
use relaunch_core::types::ApplyStrategy;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Zip archive bytes holding `files`
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    fs::write(path, zip_bytes(files)).unwrap();
}

/// Write `files` under `root`, creating directories as needed
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (name, contents) in files {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(path).unwrap();
        file.write_all(contents).unwrap();
    }
}

pub fn read(root: &Path, name: &str) -> Vec<u8> {
    fs::read(root.join(name)).unwrap()
}

/// Retry policy without meaningful delays
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        strategy: RetryStrategy::FixedDelay,
        backoff_multiplier: 1.0,
        initial_delay_ms: 5,
        max_delay_ms: 5,
    }
}

/// Apply settings with millisecond timings
pub fn fast_settings(strategy: ApplyStrategy) -> ApplySettings {
    ApplySettings {
        poll_interval: Duration::from_millis(5),
        peer_exit_grace: Duration::from_millis(1),
        no_pid_delay: Duration::from_millis(1),
        peer_exit_timeout: Duration::from_millis(100),
        lock_timeout: Duration::from_secs(2),
        strategy,
        excluded_files: vec!["launchversion.json".to_string(), "launchversions.json".to_string()],
        preserved_dirs: Vec::new(),
        copy_policy: fast_policy(5),
        swap_policy: fast_policy(2),
        jitter: false,
    }
}

/// Runtime config for tests: fast retries and staging under `staging`
pub fn test_runtime_config(staging: &Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.update.staging_dir = Some(staging.to_path_buf());
    config.update.lock_timeout_secs = 2;
    config
        .retry_policies
        .operations
        .insert("download".to_string(), fast_policy(3));
    config
}

/// A temporary directory with a launcher root and a staging root inside
pub struct TestLayout {
    pub temp: TempDir,
    pub launcher_root: PathBuf,
    pub staging_root: PathBuf,
}

impl TestLayout {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let launcher_root = temp.path().join("launcher");
        let staging_root = temp.path().join("staging");
        fs::create_dir_all(&launcher_root).unwrap();
        Self {
            temp,
            launcher_root,
            staging_root,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}
