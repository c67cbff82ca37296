//! The similarity-index seam and the shapes that cross it

use litsync_pubmed::PaperRecord;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Titles longer than this are cut in index metadata
pub const TITLE_METADATA_CHARS: usize = 200;

const ABSTRACT_MARKER: &str = "Abstract: ";

/// Per-document metadata stored alongside the embedding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocMetadata {
    pub pmid: String,
    pub title: String,
    pub journal: String,
    pub year: String,
}

impl DocMetadata {
    pub fn from_record(record: &PaperRecord) -> Self {
        Self {
            pmid: record.pmid.clone(),
            title: record.title.chars().take(TITLE_METADATA_CHARS).collect(),
            journal: record.journal.clone(),
            year: record.year.clone(),
        }
    }
}

/// Text that gets embedded: `"Title: ...\nAbstract: ..."`
pub fn document_text(record: &PaperRecord) -> String {
    format!(
        "Title: {}\n{ABSTRACT_MARKER}{}",
        record.title, record.abstract_text
    )
}

/// A search hit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub pmid: String,
    pub title: String,
    pub journal: String,
    pub year: String,
    pub abstract_text: String,
    /// Backend distance (smaller is closer); `None` for keyword hits
    pub distance: Option<f32>,
}

impl Candidate {
    pub fn from_record(record: &PaperRecord) -> Self {
        Self {
            pmid: record.pmid.clone(),
            title: record.title.clone(),
            journal: record.journal.clone(),
            year: record.year.clone(),
            abstract_text: record.abstract_text.clone(),
            distance: None,
        }
    }

    /// Build from one query result row; the abstract is recovered from the
    /// stored document text.
    pub fn from_row(metadata: DocMetadata, document: &str, distance: Option<f32>) -> Self {
        let abstract_text = document
            .split_once(ABSTRACT_MARKER)
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_default();
        Self {
            pmid: metadata.pmid,
            title: metadata.title,
            journal: metadata.journal,
            year: metadata.year,
            abstract_text,
            distance,
        }
    }
}

/// External similarity index keyed by PMID.
///
/// `upsert` must overwrite an existing id rather than duplicate it; the
/// indexer relies on that to replay a batch after a crash.
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite documents. The three slices are parallel.
    fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[DocMetadata],
    ) -> Result<(), IndexError>;

    /// Up to `limit` documents closest to `text`, closest first
    fn query(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, IndexError>;

    /// Drop every document
    fn reset(&self) -> Result<(), IndexError>;
}
