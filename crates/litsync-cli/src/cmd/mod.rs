//! Subcommand implementations

pub mod ask;
pub mod config;
pub mod index;
pub mod parse;
pub mod reset;
pub mod search;
pub mod sync;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use litsync_index::{ChromaIndex, Embedder};

use crate::config::Config;

/// Two-column summary table printed to stderr
pub(crate) fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

/// Chroma client for the configured collection; `None` when no index URL is set
pub(crate) fn open_index(config: &Config) -> Option<ChromaIndex> {
    if config.index.url.trim().is_empty() {
        return None;
    }
    let mut embedder = Embedder::new(&config.embedding.url, &config.embedding.model);
    if let Some(key) = &config.embedding.api_key {
        embedder = embedder.with_api_key(key);
    }
    Some(ChromaIndex::new(
        &config.index.url,
        &config.index.collection,
        embedder,
    ))
}
