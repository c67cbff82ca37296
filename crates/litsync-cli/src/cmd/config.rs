//! Config subcommand - show or edit settings

use std::path::Path;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::{Config, LOCAL_CONFIG, set_key};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Dotted key to set, e.g. llm.api_key
    #[arg(requires = "value")]
    pub key: Option<String>,

    /// New value
    pub value: Option<String>,
}

pub fn run(args: ConfigArgs, config: &Config, file: Option<&Path>) -> Result<()> {
    match (args.key, args.value) {
        (Some(key), Some(value)) => {
            let path = file.unwrap_or(Path::new(LOCAL_CONFIG));
            set_key(path, &key, &value)?;
            eprintln!("Set {key} in {}", path.display());
            Ok(())
        }
        _ => {
            show(config);
            Ok(())
        }
    }
}

fn secret(value: &Option<String>) -> &'static str {
    match value {
        Some(v) if !v.is_empty() => "configured",
        _ => "not set",
    }
}

fn show(config: &Config) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Data directory",
        &config.data.dir.display().to_string(),
    ]);
    table.add_row(vec!["PubMed base URL", &config.pubmed.base_url]);
    table.add_row(vec![
        "Download attempts",
        &format!(
            "{} (backoff base {}s)",
            config.pubmed.max_attempts, config.pubmed.backoff_base_secs
        ),
    ]);
    table.add_row(vec!["Pause", &format!("{}ms", config.pubmed.pause_ms)]);
    table.add_row(vec![
        "Timeouts",
        &format!(
            "connect {}s, read {}s",
            config.http.connect_timeout, config.http.read_timeout
        ),
    ]);
    table.add_row(vec!["Index URL", &config.index.url]);
    table.add_row(vec!["Collection", &config.index.collection]);
    table.add_row(vec!["Batch size", &config.index.batch_size.to_string()]);
    table.add_row(vec![
        "Embedding",
        &format!("{} @ {}", config.embedding.model, config.embedding.url),
    ]);
    table.add_row(vec!["LLM", &format!("{} @ {}", config.llm.model, config.llm.base_url)]);
    table.add_row(vec!["LLM API key", secret(&config.llm.api_key)]);

    eprintln!("\n{table}");
}
