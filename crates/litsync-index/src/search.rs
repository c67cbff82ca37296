//! Candidate lookup for `search` and `ask`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use litsync_pubmed::PaperRecord;

use crate::vector::{Candidate, VectorIndex};

/// Case-insensitive substring scan over `title + " " + abstract`.
///
/// Malformed lines are skipped. Stops after `limit` hits.
pub fn keyword_search(store: &Path, keyword: &str, limit: usize) -> Result<Vec<Candidate>> {
    let needle = keyword.trim().to_lowercase();
    let file = File::open(store).with_context(|| format!("open {}", store.display()))?;
    let reader = BufReader::new(file);
    let mut hits = Vec::new();

    if needle.is_empty() || limit == 0 {
        return Ok(hits);
    }

    for (i, line) in reader.split(b'\n').enumerate() {
        let line = line.with_context(|| format!("read {}", store.display()))?;
        let Ok(record) = serde_json::from_slice::<PaperRecord>(&line) else {
            log::debug!("{}:{}: skipped malformed line", store.display(), i + 1);
            continue;
        };
        let haystack = format!("{} {}", record.title, record.abstract_text).to_lowercase();
        if haystack.contains(&needle) {
            hits.push(Candidate::from_record(&record));
            if hits.len() >= limit {
                break;
            }
        }
    }
    Ok(hits)
}

/// Semantic lookup through `index` when requested and available, keyword
/// scan otherwise. A failing index falls back to the keyword scan.
pub fn find_candidates(
    store: &Path,
    index: Option<&dyn VectorIndex>,
    keyword: &str,
    limit: usize,
    semantic: bool,
) -> Result<Vec<Candidate>> {
    if semantic {
        match index {
            Some(index) => match index.query(keyword, limit) {
                Ok(hits) => return Ok(hits),
                Err(e) => log::warn!("Semantic search failed ({e}); using keyword search"),
            },
            None => log::info!("No index configured; using keyword search"),
        }
    }
    keyword_search(store, keyword, limit)
}
