//! Runtime configuration types for operational parameters
//!
//! These types control how an update behaves on this machine: network
//! timeouts, retry policies, how long to wait for a running instance to
//! exit and how strictly checksums are enforced. They are loaded from YAML
//! by [`HierarchicalConfigLoader`](crate::config::HierarchicalConfigLoader).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Network and HTTP configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Retry policy configurations
    #[serde(default)]
    pub retry_policies: RetryPoliciesConfig,

    /// Update engine behaviour
    #[serde(default)]
    pub update: UpdateSettings,

    /// Credentials for private release sources
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Network and HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Timeout for metadata requests in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Timeout for a whole asset download in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Size of the slices written to disk and reported as progress
    #[serde(default = "default_chunk_size")]
    pub download_chunk_size: usize,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            download_timeout_secs: default_download_timeout(),
            download_chunk_size: default_chunk_size(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}
fn default_download_timeout() -> u64 {
    1800
}
fn default_chunk_size() -> usize {
    81920
}
fn default_user_agent() -> String {
    format!(
        "relaunch/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Retry policy configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Policy for operations without an entry in `operations`
    #[serde(default)]
    pub default: RetryPolicy,

    /// Per-operation policies keyed by operation name
    #[serde(default)]
    pub operations: HashMap<String, RetryPolicy>,
}

impl RetryPoliciesConfig {
    /// Policy for `operation`, falling back to the default policy
    pub fn get(&self, operation: &str) -> RetryPolicy {
        self.operations
            .get(operation)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl Default for RetryPoliciesConfig {
    fn default() -> Self {
        let mut operations = HashMap::new();
        operations.insert("download".to_string(), RetryPolicy::download_default());
        operations.insert("copy".to_string(), RetryPolicy::copy_default());
        operations.insert("swap".to_string(), RetryPolicy::copy_default());

        Self {
            default: RetryPolicy::default(),
            operations,
        }
    }
}

/// Retry policy for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Three attempts with exponential backoff starting at one second
    pub fn download_default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            backoff_multiplier: 2.0,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
        }
    }

    /// Five attempts one second apart, enough for the OS to release a
    /// just-exited executable
    pub fn copy_default() -> Self {
        Self {
            max_attempts: 5,
            strategy: RetryStrategy::FixedDelay,
            backoff_multiplier: 1.0,
            initial_delay_ms: 1000,
            max_delay_ms: 1000,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Retry immediately
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Delay grows by `initial-delay-ms` each attempt
    LinearBackoff,
}

/// What to do when a downloaded artifact does not match its published digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrityMode {
    /// A mismatch aborts the update
    #[default]
    Enforce,
    /// A mismatch is logged and the update proceeds
    Advisory,
}

impl FromStr for IntegrityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(IntegrityMode::Enforce),
            "advisory" => Ok(IntegrityMode::Advisory),
            other => Err(format!("unknown integrity mode '{}'", other)),
        }
    }
}

impl fmt::Display for IntegrityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityMode::Enforce => f.write_str("enforce"),
            IntegrityMode::Advisory => f.write_str("advisory"),
        }
    }
}

/// How staged files reach the live install root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyStrategy {
    /// Build a shadow copy beside the install root and swap it in with
    /// directory renames, overwriting in place only if the swap is refused
    #[default]
    ShadowSwap,
    /// Overwrite files inside the live install root
    DirectOverwrite,
}

impl FromStr for ApplyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shadow-swap" => Ok(ApplyStrategy::ShadowSwap),
            "direct-overwrite" => Ok(ApplyStrategy::DirectOverwrite),
            other => Err(format!("unknown apply strategy '{}'", other)),
        }
    }
}

impl fmt::Display for ApplyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyStrategy::ShadowSwap => f.write_str("shadow-swap"),
            ApplyStrategy::DirectOverwrite => f.write_str("direct-overwrite"),
        }
    }
}

/// Update engine behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateSettings {
    /// How often to check whether the replaced process is still alive
    #[serde(default = "default_peer_poll_interval")]
    pub peer_poll_interval_ms: u64,

    /// Extra wait after the peer exits so the OS releases its file handles
    #[serde(default = "default_peer_exit_grace")]
    pub peer_exit_grace_ms: u64,

    /// Wait used when no peer PID was given
    #[serde(default = "default_no_pid_delay")]
    pub no_pid_delay_ms: u64,

    /// Upper bound on waiting for the peer to exit
    #[serde(default = "default_peer_exit_timeout")]
    pub peer_exit_timeout_secs: u64,

    #[serde(default)]
    pub integrity_mode: IntegrityMode,

    #[serde(default)]
    pub apply_strategy: ApplyStrategy,

    /// File names never copied from a payload into the install root
    #[serde(default = "default_excluded_files")]
    pub excluded_files: Vec<String>,

    /// Subfolders of the launcher root left in place by a shadow swap, in
    /// addition to the client folder
    #[serde(default)]
    pub preserved_dirs: Vec<String>,

    /// How long to wait for another update holding the install lock
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Parent directory for staging areas; the system temp dir when unset
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl UpdateSettings {
    pub fn peer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.peer_poll_interval_ms)
    }

    pub fn peer_exit_grace(&self) -> Duration {
        Duration::from_millis(self.peer_exit_grace_ms)
    }

    pub fn no_pid_delay(&self) -> Duration {
        Duration::from_millis(self.no_pid_delay_ms)
    }

    pub fn peer_exit_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_exit_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Directory under which staging areas are created
    pub fn staging_root(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("relaunch-staging"))
    }
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            peer_poll_interval_ms: default_peer_poll_interval(),
            peer_exit_grace_ms: default_peer_exit_grace(),
            no_pid_delay_ms: default_no_pid_delay(),
            peer_exit_timeout_secs: default_peer_exit_timeout(),
            integrity_mode: IntegrityMode::default(),
            apply_strategy: ApplyStrategy::default(),
            excluded_files: default_excluded_files(),
            preserved_dirs: Vec::new(),
            lock_timeout_secs: default_lock_timeout(),
            staging_dir: None,
        }
    }
}

fn default_peer_poll_interval() -> u64 {
    250
}
fn default_peer_exit_grace() -> u64 {
    1500
}
fn default_no_pid_delay() -> u64 {
    1000
}
fn default_peer_exit_timeout() -> u64 {
    120
}
fn default_excluded_files() -> Vec<String> {
    vec![
        "launchversion.json".to_string(),
        "launchversions.json".to_string(),
    ]
}
fn default_lock_timeout() -> u64 {
    30
}

/// Credentials for private release sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthConfig {
    /// Environment variables consulted, in order, for a bearer token
    #[serde(default = "default_token_env")]
    pub token_env: Vec<String>,
}

impl AuthConfig {
    /// First non-empty token among the configured environment variables
    pub fn resolve_token(&self) -> Option<String> {
        self.token_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> Vec<String> {
    vec!["RELAUNCH_TOKEN".to_string(), "GITHUB_TOKEN".to_string()]
}
