//! Reset subcommand - empty the index and forget the checkpoint

use anyhow::{Context, Result};

use super::open_index;
use crate::config::Config;

pub fn run(config: &Config) -> Result<()> {
    let index = open_index(config).context("index.url is not configured")?;
    litsync_index::reset(&index, &config.data.store_path())?;
    eprintln!(
        "Collection '{}' cleared; next `litsync index` starts from line 0",
        config.index.collection
    );
    Ok(())
}
