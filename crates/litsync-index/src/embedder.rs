//! Client for an OpenAI-compatible `/embeddings` endpoint

use serde::Deserialize;

use litsync_core::{SHARED_RUNTIME, http_client};

use crate::error::{IndexError, check_status};

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Computes embeddings for documents and queries
#[derive(Debug, Clone)]
pub struct Embedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl Embedder {
    /// `base_url` is the API root, e.g. `http://localhost:11434/v1`
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http_client().clone(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>`; empty keys are ignored
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One vector per input text, in input order
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": &self.model,
            "input": texts,
        });

        let parsed: EmbeddingResponse = SHARED_RUNTIME.handle().block_on(async {
            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            let resp = check_status(request.send().await?).await?;
            Ok::<_, IndexError>(resp.json().await?)
        })?;

        let mut items = parsed.data;
        if items.len() != texts.len() {
            return Err(IndexError::Embedding(format!(
                "{} vectors for {} texts",
                items.len(),
                texts.len()
            )));
        }
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }

    /// Embed a single query string
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| IndexError::Embedding("no vector returned".to_string()))
    }
}
