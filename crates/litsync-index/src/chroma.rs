//! Chroma server over its REST API (v1)
//!
//! Embeddings are computed client-side by an [`Embedder`]; Chroma only
//! stores vectors, documents and metadata.

use std::sync::Mutex;

use serde::Deserialize;
use serde_json::{Value, json};

use litsync_core::{SHARED_RUNTIME, http_client};

use crate::embedder::Embedder;
use crate::error::{IndexError, check_status};
use crate::vector::{Candidate, DocMetadata, VectorIndex};

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

/// Column-major query result: one inner list per query embedding
#[derive(Deserialize, Default)]
#[serde(default)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    documents: Vec<Vec<Option<String>>>,
    metadatas: Vec<Vec<Option<DocMetadata>>>,
    distances: Vec<Vec<Option<f32>>>,
}

impl QueryResponse {
    /// Rows of the first (only) query
    fn into_candidates(self) -> Vec<Candidate> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let mut documents = self.documents.into_iter().next().unwrap_or_default().into_iter();
        let mut metadatas = self.metadatas.into_iter().next().unwrap_or_default().into_iter();
        let mut distances = self.distances.into_iter().next().unwrap_or_default().into_iter();

        ids.into_iter()
            .map(|id| {
                let document = documents.next().flatten().unwrap_or_default();
                let mut metadata = metadatas.next().flatten().unwrap_or_default();
                if metadata.pmid.is_empty() {
                    metadata.pmid = id;
                }
                Candidate::from_row(metadata, &document, distances.next().flatten())
            })
            .collect()
    }
}

/// A named Chroma collection using cosine distance
pub struct ChromaIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    embedder: Embedder,
    collection_id: Mutex<Option<String>>,
}

impl ChromaIndex {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>, embedder: Embedder) -> Self {
        Self {
            client: http_client().clone(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            embedder,
            collection_id: Mutex::new(None),
        }
    }

    fn collections_url(&self) -> String {
        format!("{}/api/v1/collections", self.base_url)
    }

    fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response, IndexError> {
        SHARED_RUNTIME.handle().block_on(async {
            let resp = self.client.post(url).json(body).send().await?;
            check_status(resp).await
        })
    }

    /// Id of the collection, created on first use
    fn collection_id(&self) -> Result<String, IndexError> {
        let mut cached = self
            .collection_id
            .lock()
            .map_err(|_| IndexError::Decode("collection id lock poisoned".to_string()))?;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let body = json!({
            "name": &self.collection,
            "metadata": {"hnsw:space": "cosine"},
            "get_or_create": true,
        });
        let resp = self.post(&self.collections_url(), &body)?;
        let info: CollectionInfo = SHARED_RUNTIME.handle().block_on(resp.json())?;
        log::debug!("Chroma collection {} has id {}", self.collection, info.id);
        *cached = Some(info.id.clone());
        Ok(info.id)
    }
}

impl VectorIndex for ChromaIndex {
    fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[DocMetadata],
    ) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        let embeddings = self.embedder.embed(documents)?;
        let url = format!("{}/{}/upsert", self.collections_url(), self.collection_id()?);
        let body = json!({
            "ids": ids,
            "embeddings": embeddings,
            "documents": documents,
            "metadatas": metadatas,
        });
        self.post(&url, &body)?;
        Ok(())
    }

    fn query(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, IndexError> {
        let embedding = self.embedder.embed_one(text)?;
        let url = format!("{}/{}/query", self.collections_url(), self.collection_id()?);
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": limit,
            "include": ["documents", "metadatas", "distances"],
        });
        let resp = self.post(&url, &body)?;
        let parsed: QueryResponse = SHARED_RUNTIME.handle().block_on(resp.json())?;
        Ok(parsed.into_candidates())
    }

    fn reset(&self) -> Result<(), IndexError> {
        let url = format!("{}/{}", self.collections_url(), self.collection);
        let result = SHARED_RUNTIME.handle().block_on(async {
            let resp = self.client.delete(&url).send().await?;
            check_status(resp).await
        });
        match result {
            Ok(_) => {}
            // Deleting a collection that does not exist yet
            Err(IndexError::Http {
                status: Some(s), ..
            }) if s == 404 || s == 400 => {
                log::debug!("Collection {} did not exist", self.collection);
            }
            Err(e) => return Err(e),
        }
        if let Ok(mut cached) = self.collection_id.lock() {
            *cached = None;
        }
        self.collection_id()?;
        Ok(())
    }
}
