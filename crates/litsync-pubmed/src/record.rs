//! Normalized literature record
//!
//! One `PaperRecord` per `<PubmedArticle>`, serialized as one JSON object
//! per line in the record store. Field order is the on-disk key order.

use serde::{Deserialize, Serialize};

/// A decoded citation. Missing optional structure resolves to empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperRecord {
    /// PMID, the primary key
    pub pmid: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// `"Last Fore"`, document order
    pub authors: Vec<String>,
    pub journal: String,
    /// Four-character year, or empty
    pub year: String,
    pub doi: String,
    pub pmcid: String,
    /// Distinct publication types, first occurrence order
    pub pub_types: Vec<String>,
    /// Distinct language codes, first occurrence order
    pub languages: Vec<String>,
    /// `"Descriptor"` or `"Descriptor [Qualifier, Qualifier]"`
    pub mesh_terms: Vec<String>,
    pub chemicals: Vec<String>,
    pub keywords: Vec<String>,
}

impl PaperRecord {
    /// Whether the record carries any text worth indexing
    pub fn has_text(&self) -> bool {
        !self.title.trim().is_empty() || !self.abstract_text.trim().is_empty()
    }

    /// Serialize as one store line (no trailing newline)
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Append `value` unless already present
pub(crate) fn push_unique(set: &mut Vec<String>, value: String) {
    if !set.contains(&value) {
        set.push(value);
    }
}
