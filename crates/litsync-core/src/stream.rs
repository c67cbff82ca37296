//! Shared HTTP client and an async-to-sync body bridge with read timeout.
//!
//! Requests run on a small shared tokio runtime, but every stage of the
//! pipeline is written against blocking `std::io` interfaces: a response
//! body is handed out as a [`TimeoutReader`] that fails with `TimedOut`
//! when the server stalls.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::{LazyLock, OnceLock};
use std::task::Context;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, ReadBuf};

/// Network settings shared by every request of a run
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Stall detection: a body read with no data for this long fails
    pub read_timeout: Duration,
    /// `User-Agent` sent with every request
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            user_agent: concat!("litsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the process-wide HTTP settings.
///
/// Must run before the first request; later calls are ignored.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already initialised, keeping the first one");
    }
}

/// Current HTTP settings (defaults if never set)
pub fn http_config() -> &'static HttpConfig {
    HTTP_CONFIG.get_or_init(HttpConfig::default)
}

/// Error types for network operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code (None = transport failure)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error while reading the body
    Io(std::io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Create HTTP error from an unexpected response status
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        Self::Http {
            status: Some(status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }
    }

    /// Transient failures: transport errors, timeouts, 5xx, 408 and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(s), ..
            } => *s >= 500 || *s == 408 || *s == 429,
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    let config = http_config();
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone())
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Turn a response body into a blocking reader with stall detection
pub fn body_reader(response: reqwest::Response) -> TimeoutReader {
    let stream = response
        .bytes_stream()
        .map(|result| result.map_err(io::Error::other));
    let async_reader = tokio_util::io::StreamReader::new(stream);
    TimeoutReader::new(Box::pin(async_reader), http_config().read_timeout)
}

/// Async-to-sync bridge with read timeout.
///
/// Each read blocks on the shared runtime. If no data arrives within the
/// configured timeout the read returns `TimedOut`, which callers treat as
/// a retryable failure.
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
    timeout: Duration,
}

impl TimeoutReader {
    pub fn new(inner: Pin<Box<dyn AsyncRead + Send + Sync>>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(timeout, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read timeout ({}s with no data)", timeout.as_secs()),
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> StreamError {
        StreamError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn server_errors_retryable() {
        assert!(http_err(500).is_retryable());
        assert!(http_err(502).is_retryable());
        assert!(http_err(503).is_retryable());
    }

    #[test]
    fn throttling_retryable() {
        assert!(http_err(429).is_retryable());
        assert!(http_err(408).is_retryable());
    }

    #[test]
    fn client_errors_not_retryable() {
        assert!(!http_err(404).is_retryable());
        assert!(!http_err(403).is_retryable());
        assert!(!http_err(400).is_retryable());
    }

    #[test]
    fn transport_error_retryable() {
        let err = StreamError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn io_timeout_retryable() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
        assert!(err.is_retryable());
    }

    #[test]
    fn io_storage_full_not_retryable() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn from_status_keeps_code() {
        let err = StreamError::from_status(reqwest::StatusCode::NOT_FOUND);
        assert_eq!(format!("{err}"), "HTTP 404: Not Found");
    }

    #[test]
    fn display_without_status() {
        let err = StreamError::Http {
            status: None,
            message: "timeout".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP error: timeout");
    }

    #[test]
    fn default_http_config() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("litsync/"));
    }
}
