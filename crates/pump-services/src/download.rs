//! Range downloader — fetch one block of a remote file into a local file.
//!
//! Ranged styles send `Range: bytes=<start>-<end>`; the whole style sends a
//! plain GET. The body is written starting at a caller-chosen local offset:
//! one seek, then sequential writes of `buffer_size` bytes. The local file is
//! created when missing and never truncated, so several downloaders can fill
//! disjoint regions of the same file.
//!
//! `fetch` never fails. Every error is classified, logged, and folded into the
//! fixed failure outcome.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode, Url};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use pump_core::config::TransferSettings;
use pump_core::partition::Partition;

pub const SUCCESS_CODE: u16 = 201;
pub const SUCCESS_MESSAGE: &str = "Downloaded";
pub const FAILURE_CODE: u16 = 499;
pub const FAILURE_MESSAGE: &str = "http download problem";

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What the caller sees: a fixed code/message pair and the bytes written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub code: u16,
    pub message: &'static str,
    pub bytes: u64,
}

impl Outcome {
    pub fn success(bytes: u64) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: SUCCESS_MESSAGE,
            bytes,
        }
    }

    pub fn failure() -> Self {
        Self {
            code: FAILURE_CODE,
            message: FAILURE_MESSAGE,
            bytes: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

// ── Credentials ───────────────────────────────────────────────────────────────

/// HTTP basic-auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: Option<String>) -> Self {
        Self {
            user: user.into(),
            password,
        }
    }

    /// Remove userinfo from `url`, returning it as credentials.
    pub fn take_from_url(url: &mut Url) -> Option<Self> {
        if url.username().is_empty() {
            return None;
        }
        let creds = Self::new(url.username(), url.password().map(str::to_string));
        // Only fails for URLs that cannot carry userinfo, which this one did.
        let _ = url.set_username("");
        let _ = url.set_password(None);
        Some(creds)
    }

    fn from_settings(settings: &TransferSettings) -> Option<Self> {
        settings
            .user
            .as_ref()
            .map(|user| Self::new(user.clone(), settings.password.clone()))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a fetch failed. Only ever logged; callers see [`Outcome::failure`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("server rejected request: {code} {reason}")]
    Server { code: u16, reason: String },

    #[error("network failure: {reason}")]
    Network { reason: String },

    #[error("unexpected {kind} failure: {detail}")]
    Unexpected { kind: &'static str, detail: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FetchError::Server {
                code: status.as_u16(),
                reason: e.to_string(),
            };
        }
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return FetchError::Network {
                reason: e.to_string(),
            };
        }
        FetchError::Unexpected {
            kind: if e.is_body() || e.is_decode() { "body" } else { "http" },
            detail: e.to_string(),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::Unexpected {
            kind: "io",
            detail: e.to_string(),
        }
    }
}

// ── Downloader ────────────────────────────────────────────────────────────────

/// HTTP(S) block fetcher. Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct RangeDownloader {
    client: Client,
    buffer_size: usize,
    credentials: Option<Credentials>,
}

impl RangeDownloader {
    pub fn new(settings: &TransferSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            buffer_size: settings.buffer_size.max(1),
            credentials: Credentials::from_settings(settings),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Fetch the block `partition` describes from `url` into `local_file` at
    /// `local_offset`.
    ///
    /// Credentials, in order of preference: `credentials`, the configured
    /// override, userinfo embedded in `url`.
    pub async fn fetch(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        partition: &Partition,
        local_file: &Path,
        local_offset: u64,
    ) -> Outcome {
        match self
            .try_fetch(url, credentials, partition, local_file, local_offset)
            .await
        {
            Ok(bytes) => {
                tracing::info!(
                    url,
                    path = %local_file.display(),
                    offset = local_offset,
                    bytes,
                    code = SUCCESS_CODE,
                    "{}",
                    SUCCESS_MESSAGE
                );
                Outcome::success(bytes)
            }
            Err(e) => {
                match &e {
                    FetchError::Server { code, .. } => {
                        tracing::error!(url, status = code, error = %e, code = FAILURE_CODE, "{}", FAILURE_MESSAGE)
                    }
                    FetchError::Network { .. } => {
                        tracing::error!(url, error = %e, code = FAILURE_CODE, "{}", FAILURE_MESSAGE)
                    }
                    FetchError::Unexpected { kind, .. } => {
                        tracing::error!(url, kind, error = %e, code = FAILURE_CODE, "{}", FAILURE_MESSAGE)
                    }
                }
                Outcome::failure()
            }
        }
    }

    async fn try_fetch(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        partition: &Partition,
        local_file: &Path,
        local_offset: u64,
    ) -> Result<u64, FetchError> {
        let mut url = Url::parse(url).map_err(|e| FetchError::Unexpected {
            kind: "url",
            detail: e.to_string(),
        })?;
        let embedded = Credentials::take_from_url(&mut url);
        let credentials = credentials
            .or(self.credentials.as_ref())
            .or(embedded.as_ref());

        let mut request = self.client.get(url);
        if let Some(c) = credentials {
            request = request.basic_auth(&c.user, c.password.as_ref());
        }

        let ranged = partition.style.is_ranged();
        let range = if ranged { partition.span().range_header() } else { None };
        if let Some(range) = &range {
            request = request.header(RANGE, range);
        }

        let mut response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Server {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        // A full body written at a block offset would overrun sibling blocks.
        if range.is_some() && status != StatusCode::PARTIAL_CONTENT {
            return Err(FetchError::Server {
                code: status.as_u16(),
                reason: "range request not honoured".into(),
            });
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(local_file)
            .await?;
        file.seek(SeekFrom::Start(local_offset)).await?;

        let mut staged = BytesMut::with_capacity(self.buffer_size);
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            staged.extend_from_slice(&chunk);
            while staged.len() >= self.buffer_size {
                let block = staged.split_to(self.buffer_size);
                file.write_all(&block).await?;
                written += block.len() as u64;
            }
        }
        if !staged.is_empty() {
            file.write_all(&staged).await?;
            written += staged.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
