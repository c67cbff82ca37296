//! Sync subcommand - mirror the PubMed baseline archives

use std::time::Instant;

use anyhow::Result;
use clap::Args;

use litsync_core::SharedProgress;
use litsync_pubmed::Fetcher;

use super::print_summary;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Maximum number of archives to download (default or 0: all)
    pub limit: Option<usize>,
}

pub fn run(args: SyncArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let fetch_config = config.fetch_config();
    let dest = fetch_config.raw_dir.clone();
    std::fs::create_dir_all(&dest)?;

    let start = Instant::now();
    let fetcher = Fetcher::new(&fetch_config, progress.clone());
    let summary = fetcher.sync_all(&dest, args.limit.or(fetch_config.max_files));

    let mut rows = vec![
        ("Listed", summary.listed.to_string()),
        (
            "Downloaded",
            format!(
                "{}/{} ({} failed)",
                summary.succeeded, summary.attempted, summary.failed
            ),
        ),
        ("Directory", dest.display().to_string()),
        ("Time", format!("{:.1}s", start.elapsed().as_secs_f64())),
    ];
    if summary.interrupted {
        rows.push(("Status", "interrupted".to_string()));
    }
    print_summary("Sync", &rows);

    for (name, reason) in &summary.failures {
        log::error!("{name}: {reason}");
    }
    if summary.listed == 0 {
        anyhow::bail!("no archives listed at {}", fetch_config.base_url);
    }
    if summary.failed > 0 {
        anyhow::bail!("{} of {} downloads failed", summary.failed, summary.attempted);
    }
    Ok(())
}
