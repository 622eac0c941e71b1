//! Artifact download with progress reporting and resume
//!
//! Bytes are streamed to `<destination>.part` and the file is renamed into
//! place only after the body was fully received, so a failed attempt never
//! leaves something that looks like a finished artifact. A later attempt
//! resumes the partial file with a `Range` request; servers that ignore the
//! range answer 200 and the partial file is truncated.

use futures_util::StreamExt;
use relaunch_core::retry::{HttpStatusPredicate, RetryExecutor, TracingObserver};
use relaunch_core::types::{RetryPolicy, RuntimeConfig};
use reqwest::header::{ACCEPT, RANGE};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, UpdateError};
use crate::progress::{Progress, UpdateListener};

/// Statuses worth another attempt; 416 follows a discarded partial file
const RETRYABLE_STATUSES: &[u16] = &[408, 416, 425, 429, 500, 502, 503, 504];

/// Download progress information
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// `None` when the server did not declare a length
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
}

impl DownloadProgress {
    pub fn new(total_bytes: Option<u64>) -> Self {
        Self {
            total_bytes,
            downloaded_bytes: 0,
        }
    }

    pub fn update(&mut self, downloaded_bytes: u64) {
        self.downloaded_bytes = downloaded_bytes;
    }

    /// Progress percentage (0-100) when the length is known
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_bytes
            .is_some_and(|total| self.downloaded_bytes >= total)
    }
}

impl From<&DownloadProgress> for Progress {
    fn from(progress: &DownloadProgress) -> Self {
        Progress::Download {
            received: progress.downloaded_bytes,
            total: progress.total_bytes,
        }
    }
}

/// Streams release assets to disk
pub struct ArtifactDownloader {
    client: reqwest::Client,
    chunk_size: usize,
    retry_policy: RetryPolicy,
    jitter: bool,
}

impl ArtifactDownloader {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.network.user_agent)
            .timeout(Duration::from_secs(config.network.download_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            chunk_size: config.network.download_chunk_size.max(1),
            retry_policy: config.retry_policies.get("download"),
            jitter: true,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Enable or disable jitter on retry delays
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Download `url` (or `api_url` when a token is present) to `destination`
    ///
    /// Returns the size of the finished file. Transport failures and
    /// retryable statuses are retried under the `download` policy; anything
    /// else aborts immediately.
    pub async fn download(
        &self,
        url: &str,
        api_url: Option<&str>,
        destination: &Path,
        token: Option<&str>,
        listener: &dyn UpdateListener,
    ) -> Result<u64> {
        let token = token.filter(|t| !t.is_empty());
        let (request_url, via_api) = match (api_url.filter(|u| !u.is_empty()), token) {
            (Some(api), Some(_)) => (api, true),
            _ => (url, false),
        };

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Downloading {} to {}", request_url, destination.display());
        listener.on_status(&format!("Downloading {}", file_label(request_url)));

        let executor = RetryExecutor::new(self.retry_policy.clone())
            .with_predicate(HttpStatusPredicate::with_codes(RETRYABLE_STATUSES.to_vec()))
            .with_observer(TracingObserver::new("download"))
            .with_jitter(self.jitter);

        let bytes = executor
            .execute(|| self.download_once(request_url, via_api, destination, token, listener))
            .await?;

        info!("Downloaded {} bytes", bytes);
        Ok(bytes)
    }

    async fn download_once(
        &self,
        url: &str,
        via_api: bool,
        destination: &Path,
        token: Option<&str>,
        listener: &dyn UpdateListener,
    ) -> Result<u64> {
        let part_path = part_path(destination);
        let start_pos = match tokio::fs::metadata(&part_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(url);
        if via_api {
            request = request.header(ACCEPT, "application/octet-stream");
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if start_pos > 0 {
            debug!("Resuming download from byte {}", start_pos);
            request = request.header(RANGE, format!("bytes={}-", start_pos));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && start_pos > 0 {
            // stale partial file; the next attempt starts from zero
            tokio::fs::remove_file(&part_path).await?;
            return Err(UpdateError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(UpdateError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let resumed = status == StatusCode::PARTIAL_CONTENT;
        let offset = if resumed { start_pos } else { 0 };
        let mut progress =
            DownloadProgress::new(response.content_length().map(|len| len + offset));
        progress.update(offset);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(resumed)
            .truncate(!resumed)
            .open(&part_path)
            .await?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk: bytes::Bytes = chunk?;
            for piece in chunk.chunks(self.chunk_size) {
                file.write_all(piece).await?;
                progress.update(progress.downloaded_bytes + piece.len() as u64);
                listener.on_progress(&Progress::from(&progress));
            }
        }
        file.flush().await?;
        drop(file);

        if let Some(total) = progress.total_bytes {
            if progress.downloaded_bytes < total {
                // 502 keeps the attempt retryable; the .part file is resumed
                return Err(UpdateError::Http {
                    status: 502,
                    url: format!(
                        "{} (body ended at {} of {} bytes)",
                        url, progress.downloaded_bytes, total
                    ),
                });
            }
        }

        tokio::fs::rename(&part_path, destination).await?;
        Ok(progress.downloaded_bytes)
    }
}

/// Temporary path used while a download is in flight
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn file_label(url: &str) -> &str {
    url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(url)
}
