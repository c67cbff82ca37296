//! Litsync PubMed - acquisition and decoding of the PubMed baseline
//!
//! Lists and downloads the baseline `.xml.gz` archives with byte-range
//! resume, then streams each archive into a JSON-lines record store.
//!
//! # Features
//!
//! - Resume state derived from the local file size, nothing else persisted
//! - Streaming XML decoding with quick-xml, one record in memory at a time
//! - Deterministic store rewrite (archives in sorted-name order)
//!
//! # Example
//!
//! ```ignore
//! use litsync_pubmed::{Config, Fetcher, decode_all};
//!
//! let config = Config { max_files: Some(1), ..Default::default() };
//! let fetcher = Fetcher::new(&config, progress.clone());
//! let synced = fetcher.sync_all(&config.raw_dir, config.max_files);
//! let parsed = decode_all(&config.raw_dir, "data/metadata.jsonl".as_ref(), &progress)?;
//! println!("{} files, {} records", synced.succeeded, parsed.records);
//! ```

pub mod codec;
pub mod config;
pub mod fetch;
pub mod manifest;
pub mod record;
pub mod store;

// Re-exports
pub use codec::ArchiveDecoder;
pub use config::Config;
pub use fetch::{FetchError, Fetcher, SyncSummary};
pub use manifest::RemoteFile;
pub use record::PaperRecord;
pub use store::{ParseSummary, StoreWriter, decode_all, list_archives};
