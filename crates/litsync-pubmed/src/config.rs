//! PubMed acquisition configuration

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for listing and downloading archives
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory index of the baseline archives
    pub base_url: String,
    /// Where downloaded archives are kept (`data/raw`)
    pub raw_dir: PathBuf,
    /// Maximum files to sync (for testing)
    pub max_files: Option<usize>,
    /// Download attempts per file before giving up
    pub max_attempts: u32,
    /// First backoff delay; doubles after every failed attempt
    pub backoff_base: Duration,
    /// Pause between consecutive files
    pub pause_between_files: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://ftp.ncbi.nlm.nih.gov/pubmed/baseline/".to_string(),
            raw_dir: PathBuf::from("data/raw"),
            max_files: None,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            pause_between_files: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.raw_dir, PathBuf::from("data/raw"));
        assert!(config.max_files.is_none());
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff_base, Duration::from_secs(5));
        assert!(config.base_url.starts_with("https://"));
    }
}
