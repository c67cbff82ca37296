//! litsync - PubMed baseline mirror with a searchable abstract index
//!
//! Downloads the baseline archives, decodes them into a JSON-lines record
//! store, loads the store into a similarity index and answers questions
//! from the retrieved abstracts.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod assistant;
mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "litsync")]
#[command(about = "PubMed baseline mirror with a searchable abstract index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./litsync.toml or ~/.config/litsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding raw/ and metadata.jsonl
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Download baseline archives, resuming partial files
    Sync(cmd::sync::SyncArgs),
    /// Decode downloaded archives into the record store
    Parse(cmd::parse::ParseArgs),
    /// Index store lines added since the last run
    Index(cmd::index::IndexArgs),
    /// Clear the index and its checkpoint
    Reset,
    /// Search stored records
    Search(cmd::search::SearchArgs),
    /// Ask a question answered from retrieved abstracts
    Ask(cmd::ask::AskArgs),
    /// Show configuration, or set one key
    Config(cmd::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(litsync_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug; progress bars show activity
    //   non-TTY: info unless --debug; logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    litsync_core::init_logging(quiet, cli.debug, multi);

    if let Err(e) = litsync_core::install_signal_handlers() {
        log::warn!("Could not install signal handlers: {e}");
    }

    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };
    if let Some(dir) = cli.data_dir {
        config.data.dir = dir;
    }
    if let Some(secs) = cli.read_timeout {
        config.http.read_timeout = secs;
    }
    litsync_core::set_http_config(config.http_config());

    match cli.command {
        Command::Sync(args) => cmd::sync::run(args, &config, &progress),
        Command::Parse(args) => cmd::parse::run(args, &config, &progress),
        Command::Index(args) => cmd::index::run(args, &config, &progress),
        Command::Reset => cmd::reset::run(&config),
        Command::Search(args) => cmd::search::run(args, &config),
        Command::Ask(args) => cmd::ask::run(args, &config),
        Command::Config(args) => cmd::config::run(args, &config, cli.config.as_deref()),
    }
}
