//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Name of the per-directory config file
pub const LOCAL_CONFIG: &str = "litsync.toml";

/// Global configuration for litsync
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub pubmed: PubmedConfig,
    pub http: HttpSection,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

impl DataConfig {
    /// Downloaded archives
    pub fn raw_dir(&self) -> PathBuf {
        self.dir.join("raw")
    }

    /// Record store
    pub fn store_path(&self) -> PathBuf {
        self.dir.join("metadata.jsonl")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PubmedConfig {
    pub base_url: String,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub pause_ms: u64,
}

impl Default for PubmedConfig {
    fn default() -> Self {
        let defaults = litsync_pubmed::Config::default();
        Self {
            base_url: defaults.base_url,
            max_attempts: defaults.max_attempts,
            backoff_base_secs: defaults.backoff_base.as_secs(),
            pause_ms: defaults.pause_between_files.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Seconds to establish a connection
    pub connect_timeout: u64,
    /// Seconds without body data before a read fails
    pub read_timeout: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            read_timeout: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Chroma server; empty disables semantic search
    pub url: String,
    pub collection: String,
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            collection: "pubmed_papers".to_string(),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible API root serving `/embeddings`
    pub url: String,
    pub model: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/v1".to_string(),
            model: "all-minilm".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: std::env::var("DEEPSEEK_API_KEY").ok(),
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./litsync.toml (current directory)
    /// 2. ~/.config/litsync/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "litsync") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Fetcher settings for archives kept under the data directory
    pub fn fetch_config(&self) -> litsync_pubmed::Config {
        litsync_pubmed::Config {
            base_url: self.pubmed.base_url.clone(),
            raw_dir: self.data.raw_dir(),
            max_files: None,
            max_attempts: self.pubmed.max_attempts,
            backoff_base: Duration::from_secs(self.pubmed.backoff_base_secs),
            pause_between_files: Duration::from_millis(self.pubmed.pause_ms),
        }
    }

    pub fn http_config(&self) -> litsync_core::HttpConfig {
        litsync_core::HttpConfig {
            connect_timeout: Duration::from_secs(self.http.connect_timeout),
            read_timeout: Duration::from_secs(self.http.read_timeout),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Int,
}

/// Keys accepted by `litsync config <key> <value>`
const KEYS: &[(&str, Kind)] = &[
    ("data.dir", Kind::Str),
    ("pubmed.base_url", Kind::Str),
    ("pubmed.max_attempts", Kind::Int),
    ("pubmed.backoff_base_secs", Kind::Int),
    ("pubmed.pause_ms", Kind::Int),
    ("http.connect_timeout", Kind::Int),
    ("http.read_timeout", Kind::Int),
    ("index.url", Kind::Str),
    ("index.collection", Kind::Str),
    ("index.batch_size", Kind::Int),
    ("embedding.url", Kind::Str),
    ("embedding.model", Kind::Str),
    ("embedding.api_key", Kind::Str),
    ("llm.base_url", Kind::Str),
    ("llm.model", Kind::Str),
    ("llm.api_key", Kind::Str),
];

/// Write one dotted key into the TOML file at `path`, keeping other entries.
///
/// The file is created if missing. The result must still parse as a
/// [`Config`]; otherwise nothing is written.
pub fn set_key(path: &Path, key: &str, value: &str) -> Result<()> {
    let Some(&(_, kind)) = KEYS.iter().find(|(k, _)| *k == key) else {
        let known: Vec<_> = KEYS.iter().map(|(k, _)| *k).collect();
        anyhow::bail!("Unknown key '{key}'. Known keys: {}", known.join(", "));
    };
    let (section, field) = key
        .split_once('.')
        .with_context(|| format!("malformed key {key}"))?;

    let mut doc: toml::Table = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        toml::Table::new()
    };

    let value = match kind {
        Kind::Str => toml::Value::String(value.to_string()),
        Kind::Int => toml::Value::Integer(
            value
                .parse()
                .with_context(|| format!("{key} expects an integer, got '{value}'"))?,
        ),
    };

    doc.entry(section)
        .or_insert_with(|| toml::Value::Table(toml::Table::new()))
        .as_table_mut()
        .with_context(|| format!("'{section}' in {} is not a table", path.display()))?
        .insert(field.to_string(), value);

    let content = toml::to_string_pretty(&doc).context("failed to serialize config")?;
    toml::from_str::<Config>(&content).with_context(|| format!("invalid value for {key}"))?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}
