//! In-process index for tests and offline runs
//!
//! Ranks by the number of distinct query terms present in a document.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::IndexError;
use crate::vector::{Candidate, DocMetadata, VectorIndex};

#[derive(Debug, Default)]
pub struct MemoryIndex {
    docs: Mutex<BTreeMap<String, (String, DocMetadata)>>,
    upsert_calls: AtomicUsize,
    fail_upserts: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `upsert` calls accepted so far
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Distinct ids held
    pub fn len(&self) -> usize {
        self.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().is_ok_and(|docs| docs.contains_key(id))
    }

    /// Ids held, sorted
    pub fn ids(&self) -> Vec<String> {
        self.lock()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Reject the next `n` upserts with an HTTP 503, as an unavailable
    /// backend would
    pub fn fail_next_upserts(&self, n: usize) {
        self.fail_upserts.store(n, Ordering::SeqCst);
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (String, DocMetadata)>>, IndexError>
    {
        self.docs
            .lock()
            .map_err(|_| IndexError::Decode("memory index lock poisoned".to_string()))
    }
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl VectorIndex for MemoryIndex {
    fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[DocMetadata],
    ) -> Result<(), IndexError> {
        let pending = self.fail_upserts.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_upserts.store(pending - 1, Ordering::SeqCst);
            return Err(IndexError::Http {
                status: Some(503),
                message: "unavailable".to_string(),
            });
        }

        // Chroma refuses a request that names an id twice
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(IndexError::Http {
                    status: Some(400),
                    message: format!("duplicate id {id} in upsert"),
                });
            }
        }

        let mut docs = self.lock()?;
        for ((id, document), metadata) in ids.iter().zip(documents).zip(metadatas) {
            docs.insert(id.clone(), (document.clone(), metadata.clone()));
        }
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn query(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, IndexError> {
        let wanted = terms(text);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.lock()?;
        let mut scored: Vec<(usize, &String)> = docs
            .iter()
            .filter_map(|(id, (document, _))| {
                let score = terms(document).intersection(&wanted).count();
                (score > 0).then_some((score, id))
            })
            .collect();
        // Highest score first, ties by id
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        Ok(scored
            .into_iter()
            .take(limit)
            .filter_map(|(score, id)| {
                let (document, metadata) = docs.get(id)?;
                let distance = 1.0 - score as f32 / wanted.len() as f32;
                Some(Candidate::from_row(metadata.clone(), document, Some(distance)))
            })
            .collect())
    }

    fn reset(&self) -> Result<(), IndexError> {
        self.lock()?.clear();
        Ok(())
    }
}
