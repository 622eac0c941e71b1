//! SHA-256 verification against a published reference
//!
//! Checksums are opt-in: without a reference URL an artifact is accepted.
//! With one, a mismatch (or a reference that holds no digest) is fatal in
//! [`IntegrityMode::Enforce`] and only logged in [`IntegrityMode::Advisory`].

use regex::Regex;
use relaunch_core::types::{IntegrityMode, RuntimeConfig};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::{Result, UpdateError};
use crate::progress::{Progress, UpdateListener};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

static DIGEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Fa-f0-9]{64}\b").expect("digest regex is valid")
});

/// Outcome of one verification
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityReport {
    pub verified: bool,
    /// Digest published by the reference, lowercase
    pub expected: Option<String>,
    /// Digest of the file on disk, lowercase
    pub actual: Option<String>,
}

impl IntegrityReport {
    /// Accepted without a reference to check against
    pub fn unchecked() -> Self {
        Self {
            verified: true,
            expected: None,
            actual: None,
        }
    }
}

pub struct IntegrityVerifier {
    client: reqwest::Client,
    mode: IntegrityMode,
}

impl IntegrityVerifier {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.network.user_agent)
            .timeout(Duration::from_secs(config.network.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            mode: config.update.integrity_mode,
        })
    }

    pub fn with_mode(mut self, mode: IntegrityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> IntegrityMode {
        self.mode
    }

    /// Verify `file` against the digest published at `checksum_url`
    pub async fn verify(
        &self,
        file: &Path,
        checksum_url: Option<&str>,
        token: Option<&str>,
        listener: &dyn UpdateListener,
    ) -> Result<IntegrityReport> {
        let Some(url) = checksum_url.filter(|u| !u.trim().is_empty()) else {
            debug!("No checksum reference configured, skipping verification");
            return Ok(IntegrityReport::unchecked());
        };

        listener.on_status("Verifying download");

        let file_name = file.file_name().and_then(|n| n.to_str());
        let expected = match self.fetch_reference(url, token).await {
            Ok(text) => extract_digest(&text, file_name),
            Err(e) => {
                return self.reject(
                    UpdateError::ChecksumReference(format!("{}: {}", url, e)),
                    IntegrityReport {
                        verified: false,
                        expected: None,
                        actual: None,
                    },
                );
            }
        };

        let Some(expected) = expected else {
            return self.reject(
                UpdateError::ChecksumReference(match file_name {
                    Some(name) => format!("no SHA-256 digest for {} found at {}", name, url),
                    None => format!("no SHA-256 digest found at {}", url),
                }),
                IntegrityReport {
                    verified: false,
                    expected: None,
                    actual: None,
                },
            );
        };

        let actual = hash_with_progress(file, listener).await?;
        if actual.eq_ignore_ascii_case(&expected) {
            info!("Checksum verified: {}", actual);
            return Ok(IntegrityReport {
                verified: true,
                expected: Some(expected),
                actual: Some(actual),
            });
        }

        self.reject(
            UpdateError::Integrity {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            IntegrityReport {
                verified: false,
                expected: Some(expected),
                actual: Some(actual),
            },
        )
    }

    fn reject(&self, err: UpdateError, report: IntegrityReport) -> Result<IntegrityReport> {
        match self.mode {
            IntegrityMode::Enforce => Err(err),
            IntegrityMode::Advisory => {
                warn!("Continuing despite failed verification: {}", err);
                Ok(report)
            }
        }
    }

    async fn fetch_reference(&self, url: &str, token: Option<&str>) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Pull a 64-hex-character digest out of a checksum document
///
/// Accepts a bare digest, `sha256sum` output and human-readable text. When
/// the document lists several files, the line naming `file_name` wins; a
/// document holding several different digests and no such line yields none.
pub fn extract_digest(text: &str, file_name: Option<&str>) -> Option<String> {
    if let Some(name) = file_name {
        let named = text
            .lines()
            .filter(|line| line_names_file(line, name))
            .find_map(|line| DIGEST_RE.find(line));
        if let Some(m) = named {
            return Some(m.as_str().to_ascii_lowercase());
        }
    }

    let mut digests = DIGEST_RE.find_iter(text).map(|m| m.as_str().to_ascii_lowercase());
    let first = digests.next()?;
    if digests.all(|digest| digest == first) {
        Some(first)
    } else {
        None
    }
}

fn line_names_file(line: &str, name: &str) -> bool {
    line.split_whitespace()
        .any(|word| word.trim_start_matches('*').eq_ignore_ascii_case(name))
}

/// Lowercase hex SHA-256 of a file
pub fn compute_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

async fn hash_with_progress(path: &Path, listener: &dyn UpdateListener) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let total = file.metadata().await?.len();
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut processed = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        processed += bytes_read as u64;
        listener.on_progress(&Progress::Verify { processed, total });
    }

    Ok(hex::encode(hasher.finalize()))
}
