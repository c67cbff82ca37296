//! Resumable archive downloads
//!
//! The resume offset of a transfer is always the current size of the local
//! file. Nothing else is persisted, so an interrupted download (crash,
//! Ctrl-C, network drop) picks up where the bytes on disk end.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};

use litsync_core::progress::upgrade_to_bar;
use litsync_core::{
    SHARED_RUNTIME, SharedProgress, StreamError, backoff_duration, body_reader, http_client,
    shutdown_flag,
};

use crate::config::Config;
use crate::manifest::{RemoteFile, fetch_listing};

/// Bytes read from the body and written to disk per step
const BLOCK_SIZE: usize = 1024 * 1024;

/// Why a download did not produce a complete file
#[derive(Debug)]
pub enum FetchError {
    /// Probe or transfer failed at the HTTP layer
    Stream(StreamError),
    /// Local file could not be read or written
    Io(std::io::Error),
    /// The stream ended but the file size disagrees with the expected total
    Truncated { expected: u64, actual: u64 },
    /// Server rejected the resume offset
    RangeRejected { offset: u64 },
    /// Shutdown was requested; the partial file is kept for resume
    Interrupted,
    /// Every attempt failed
    Exhausted {
        attempts: u32,
        last: Option<Box<FetchError>>,
    },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Truncated { expected, actual } => {
                write!(f, "incomplete download: {actual} of {expected} bytes")
            }
            Self::RangeRejected { offset } => write!(f, "range starting at {offset} rejected"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Exhausted {
                attempts,
                last: Some(last),
            } => write!(f, "gave up after {attempts} attempts: {last}"),
            Self::Exhausted {
                attempts,
                last: None,
            } => write!(f, "gave up after {attempts} attempts"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<StreamError> for FetchError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stream(e) => e.is_retryable(),
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
            Self::Truncated { .. } | Self::RangeRejected { .. } => true,
            Self::Interrupted | Self::Exhausted { .. } => false,
        }
    }
}

/// Tally of one `sync_all` run
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Archives offered by the remote listing
    pub listed: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// (file name, error) for every failed file
    pub failures: Vec<(String, String)>,
    pub interrupted: bool,
}

/// Lists and downloads archives, reusing one HTTP session for all files
pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    backoff_base: Duration,
    pause_between_files: Duration,
    progress: SharedProgress,
    cancel: &'static AtomicBool,
}

impl Fetcher {
    pub fn new(config: &Config, progress: SharedProgress) -> Self {
        Self {
            client: http_client().clone(),
            base_url: config.base_url.clone(),
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base,
            pause_between_files: config.pause_between_files,
            progress,
            cancel: shutdown_flag(),
        }
    }

    /// Use a different cancellation flag than the process-wide shutdown flag
    pub fn with_cancel_flag(mut self, flag: &'static AtomicBool) -> Self {
        self.cancel = flag;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Archives available remotely, sorted by name.
    ///
    /// A failed listing is logged and yields an empty list.
    pub fn list_remote_files(&self) -> Vec<RemoteFile> {
        match fetch_listing(&self.client, &self.base_url) {
            Ok(files) => files,
            Err(e) => {
                log::error!("Listing {} failed: {e:#}", self.base_url);
                Vec::new()
            }
        }
    }

    /// Download `file` into `dest_dir`, resuming from whatever is on disk.
    pub fn fetch(
        &self,
        file: &RemoteFile,
        dest_dir: &Path,
        max_attempts: u32,
    ) -> Result<PathBuf, FetchError> {
        fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(&file.name);
        let url = file.url(&self.base_url);

        let mut last = None;
        for attempt in 0..max_attempts {
            if self.cancelled() {
                return Err(FetchError::Interrupted);
            }
            match self.attempt(file, &url, &path) {
                Ok(()) => return Ok(path),
                Err(e) if e.is_retryable() => {
                    let delay = backoff_duration(self.backoff_base, attempt);
                    log::warn!(
                        "{}: attempt {}/{max_attempts} failed: {e}",
                        file.name,
                        attempt + 1
                    );
                    last = Some(Box::new(e));
                    if attempt + 1 < max_attempts {
                        log::debug!("{}: retrying in {delay:?}", file.name);
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => {
                    log::error!("{}: failed permanently: {e}", file.name);
                    return Err(e);
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }

    /// One probe + transfer cycle
    fn attempt(&self, file: &RemoteFile, url: &str, path: &Path) -> Result<(), FetchError> {
        let on_disk = local_size(path)?;
        let probed = self.probe_size(url);

        if let Some(total) = probed {
            if on_disk >= total {
                log::info!("{}: already complete ({total} bytes)", file.name);
                return Ok(());
            }
        }

        let response = SHARED_RUNTIME
            .handle()
            .block_on(async {
                let mut request = self.client.get(url);
                if on_disk > 0 {
                    request = request.header(RANGE, format!("bytes={on_disk}-"));
                }
                request.send().await
            })
            .map_err(|e| StreamError::from_reqwest(&e))?;

        let status = response.status();
        let body_len = header_u64(response.headers(), CONTENT_LENGTH);
        let (append, expected) = match status {
            StatusCode::PARTIAL_CONTENT => (true, probed.or(body_len.map(|n| n + on_disk))),
            StatusCode::OK => {
                if on_disk > 0 {
                    log::warn!("{}: range ignored by server, restarting from 0", file.name);
                }
                (false, probed.or(body_len))
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                if content_range_total(response.headers()) == Some(on_disk) {
                    log::info!("{}: already complete ({on_disk} bytes)", file.name);
                    return Ok(());
                }
                fs::File::create(path)?;
                return Err(FetchError::RangeRejected { offset: on_disk });
            }
            other => return Err(StreamError::from_status(other).into()),
        };

        let start = if append { on_disk } else { 0 };
        let pb = self.progress.download_bar(&file.name, start);
        if let Some(total) = expected {
            upgrade_to_bar(&pb, total);
        }

        let mut out = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?
        };

        let mut reader = body_reader(response);
        let mut block = vec![0u8; BLOCK_SIZE];
        loop {
            if self.cancelled() {
                pb.abandon_with_message("interrupted");
                return Err(FetchError::Interrupted);
            }
            let n = reader.read(&mut block).map_err(StreamError::Io)?;
            if n == 0 {
                break;
            }
            out.write_all(&block[..n])?;
            out.flush()?;
            pb.inc(n as u64);
        }
        drop(out);
        pb.finish_and_clear();

        let actual = local_size(path)?;
        if let Some(expected) = expected {
            if actual != expected {
                if actual > expected {
                    // Larger than the remote file: the bytes on disk cannot be trusted
                    fs::File::create(path)?;
                }
                return Err(FetchError::Truncated { expected, actual });
            }
        }

        log::info!("{}: downloaded ({actual} bytes)", file.name);
        Ok(())
    }

    /// HEAD probe for the total size; `None` when unknown
    fn probe_size(&self, url: &str) -> Option<u64> {
        let result = SHARED_RUNTIME
            .handle()
            .block_on(async { self.client.head(url).send().await });
        match result {
            Ok(resp) if resp.status().is_success() => {
                header_u64(resp.headers(), CONTENT_LENGTH).filter(|&n| n > 0)
            }
            Ok(resp) => {
                log::debug!("HEAD {url}: HTTP {}", resp.status().as_u16());
                None
            }
            Err(e) => {
                log::debug!("HEAD {url}: {e}");
                None
            }
        }
    }

    /// Download every listed archive (up to `limit`; 0 means no limit)
    /// into `dest_dir`.
    ///
    /// A failed file is counted and skipped; it never aborts the rest.
    pub fn sync_all(&self, dest_dir: &Path, limit: Option<usize>) -> SyncSummary {
        let mut summary = SyncSummary::default();

        let files = self.list_remote_files();
        summary.listed = files.len();
        if files.is_empty() {
            log::error!("No archives found at {}", self.base_url);
            return summary;
        }
        log::info!("Found {} archives", files.len());

        let limit = match limit {
            Some(n) if n > 0 => n.min(files.len()),
            _ => files.len(),
        };
        let selected = &files[..limit];
        for (i, file) in selected.iter().enumerate() {
            if self.cancelled() {
                summary.interrupted = true;
                log::warn!("Shutdown requested, stopping sync");
                break;
            }
            summary.attempted += 1;
            match self.fetch(file, dest_dir, self.max_attempts) {
                Ok(_) => summary.succeeded += 1,
                Err(FetchError::Interrupted) => {
                    summary.interrupted = true;
                    log::warn!("{}: interrupted, partial file kept", file.name);
                    break;
                }
                Err(e) => {
                    summary.failed += 1;
                    log::error!("{}: skipped: {e}", file.name);
                    summary.failures.push((file.name.clone(), e.to_string()));
                }
            }
            if i + 1 < selected.len() && !self.pause_between_files.is_zero() {
                std::thread::sleep(self.pause_between_files);
            }
        }

        log::info!(
            "Sync finished: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed
        );
        summary
    }
}

/// Size of the local file, 0 if it does not exist
fn local_size(path: &Path) -> std::io::Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

fn header_u64(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Total length from `Content-Range: bytes */N` (or `bytes a-b/N`)
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.rsplit_once('/'))
        .and_then(|(_, total)| total.trim().parse().ok())
}
