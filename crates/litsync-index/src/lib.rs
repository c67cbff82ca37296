//! Litsync Index - checkpointed loading of the record store into a
//! similarity index, and candidate search over it.
//!
//! The store is read sequentially from the line recorded in
//! `<store>.checkpoint`. Records are upserted in batches keyed by PMID and
//! the checkpoint advances only after a batch is accepted, so a crash
//! replays at most one batch and the replay is harmless.

pub mod checkpoint;
pub mod chroma;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod memory;
pub mod search;
pub mod vector;

// Re-exports
pub use checkpoint::IndexCheckpoint;
pub use chroma::ChromaIndex;
pub use embedder::Embedder;
pub use error::IndexError;
pub use indexer::{IndexSummary, index_incremental, index_with_cancel, reset};
pub use memory::MemoryIndex;
pub use search::{find_candidates, keyword_search};
pub use vector::{Candidate, DocMetadata, VectorIndex, document_text};
