//! Errors from the index backend

/// Failure talking to the similarity index or the embedding service
#[derive(Debug)]
pub enum IndexError {
    /// Request failed (`status` is `None` for transport failures)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Response did not have the expected shape
    Decode(String),
    /// Embedding service returned an unusable result
    Embedding(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "index HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "index unreachable: {message}"),
            Self::Decode(msg) => write!(f, "unexpected index response: {msg}"),
            Self::Embedding(msg) => write!(f, "embedding failed: {msg}"),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<reqwest::Error> for IndexError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Turn a non-success response into `IndexError::Http`, keeping the body's
/// error message when it has one.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, IndexError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .or_else(|| v["detail"].as_str())
                .or_else(|| v["message"].as_str())
                .map(str::to_string)
        })
        .unwrap_or(text);
    Err(IndexError::Http {
        status: Some(status.as_u16()),
        message,
    })
}
