//! Parse subcommand - decode downloaded archives into the record store

use std::time::Instant;

use anyhow::Result;
use clap::Args;

use litsync_core::{SharedProgress, fmt_num};

use super::print_summary;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ParseArgs {}

pub fn run(_args: ParseArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let raw_dir = config.data.raw_dir();
    let store = config.data.store_path();
    if let Some(parent) = store.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let start = Instant::now();
    let summary = litsync_pubmed::decode_all(&raw_dir, &store, progress)?;

    print_summary(
        "Parse",
        &[
            (
                "Archives",
                format!(
                    "{} ({} failed)",
                    summary.files,
                    summary.failed_files.len()
                ),
            ),
            (
                "Records",
                format!(
                    "{} ({} skipped, {} duplicate PMIDs)",
                    fmt_num(summary.records),
                    fmt_num(summary.skipped),
                    fmt_num(summary.duplicates)
                ),
            ),
            ("Store", store.display().to_string()),
            ("Time", format!("{:.1}s", start.elapsed().as_secs_f64())),
        ],
    );
    for name in &summary.failed_files {
        log::warn!("Partially decoded: {name}");
    }
    Ok(())
}
