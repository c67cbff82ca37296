//! Persisted indexing progress: `<store>.checkpoint`
//!
//! Holds `{"processed_lines": n}`, the 1-based number of the last store
//! line whose batch was accepted by the index.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointFile {
    processed_lines: u64,
}

/// Checkpoint belonging to one record store
#[derive(Debug, Clone)]
pub struct IndexCheckpoint {
    path: PathBuf,
}

impl IndexCheckpoint {
    /// Checkpoint stored next to `store` (`metadata.jsonl.checkpoint`)
    pub fn for_store(store: &Path) -> Self {
        let mut name = store.as_os_str().to_owned();
        name.push(".checkpoint");
        Self {
            path: PathBuf::from(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines already processed. Missing file is 0; a corrupt one is
    /// reported and treated as 0.
    pub fn load(&self) -> u64 {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                log::warn!("Cannot read {}: {e}; starting from 0", self.path.display());
                return 0;
            }
        };
        match serde_json::from_str::<CheckpointFile>(&json) {
            Ok(cp) => cp.processed_lines,
            Err(e) => {
                log::warn!("Corrupt {}: {e}; starting from 0", self.path.display());
                0
            }
        }
    }

    /// Persist atomically (tmp + rename)
    pub fn save(&self, processed_lines: u64) -> Result<()> {
        let json = serde_json::to_string(&CheckpointFile { processed_lines })
            .context("failed to serialize checkpoint")?;
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Forget all progress
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }
}
