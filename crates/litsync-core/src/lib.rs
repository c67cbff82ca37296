//! Litsync Core - Shared plumbing for the literature ingestion pipeline
//!
//! HTTP client and blocking bridge, retry backoff, logging, progress
//! reporting and graceful shutdown. Used by the fetch, parse and index
//! stages alike.

pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod stream;

// Re-exports for convenience
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::backoff_duration;
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag};
pub use stream::{
    HttpConfig, SHARED_RUNTIME, StreamError, TimeoutReader, body_reader, http_client, http_config,
    set_http_config,
};
