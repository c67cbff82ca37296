//! Index subcommand - load new store lines into the similarity index

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use litsync_core::{SharedProgress, fmt_num};

use super::{open_index, print_summary};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Records per upsert (default: index.batch_size)
    pub batch_size: Option<usize>,

    /// Drop the index and checkpoint first, then rebuild from line 0
    #[arg(long)]
    pub reset: bool,
}

pub fn run(args: IndexArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let index = open_index(config).context("index.url is not configured")?;
    let store = config.data.store_path();
    let batch_size = args.batch_size.unwrap_or(config.index.batch_size);

    if args.reset {
        litsync_index::reset(&index, &store)?;
    }

    let start = Instant::now();
    let summary = litsync_index::index_incremental(&index, &store, batch_size, progress)?;

    let mut rows = vec![
        (
            "Lines",
            format!(
                "{} read from line {}",
                fmt_num(summary.lines_read as usize),
                fmt_num(summary.start_line as usize)
            ),
        ),
        (
            "Indexed",
            format!(
                "{} in {} batches ({} skipped)",
                fmt_num(summary.indexed),
                summary.batches,
                fmt_num(summary.skipped)
            ),
        ),
        ("Checkpoint", fmt_num(summary.checkpoint as usize)),
        ("Collection", config.index.collection.clone()),
        ("Time", format!("{:.1}s", start.elapsed().as_secs_f64())),
    ];
    if summary.interrupted {
        rows.push(("Status", "interrupted".to_string()));
    }
    print_summary("Index", &rows);
    Ok(())
}
