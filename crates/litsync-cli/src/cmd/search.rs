//! Search subcommand - keyword or semantic lookup over the store

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use litsync_index::{Candidate, VectorIndex};

use super::open_index;
use crate::config::Config;

const TITLE_WIDTH: usize = 100;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Keyword or phrase
    pub keyword: String,

    /// Maximum number of results
    #[arg(default_value_t = 10)]
    pub limit: usize,

    /// Semantic search through the index (falls back to keyword search)
    #[arg(short = 'v', long)]
    pub semantic: bool,
}

pub fn run(args: SearchArgs, config: &Config) -> Result<()> {
    let chroma = if args.semantic { open_index(config) } else { None };
    let hits = litsync_index::find_candidates(
        &config.data.store_path(),
        chroma.as_ref().map(|c| c as &dyn VectorIndex),
        &args.keyword,
        args.limit,
        args.semantic,
    )?;

    if hits.is_empty() {
        eprintln!("No results for '{}'", args.keyword);
        return Ok(());
    }
    println!("{}", results_table(&hits));
    eprintln!("{} results", hits.len());
    Ok(())
}

fn results_table(hits: &[Candidate]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("PMID").fg(Color::Cyan),
            Cell::new("Title").fg(Color::Cyan),
            Cell::new("Year").fg(Color::Cyan),
            Cell::new("Journal").fg(Color::Cyan),
        ]);
    for hit in hits {
        table.add_row(vec![
            Cell::new(&hit.pmid),
            Cell::new(truncate(&hit.title, TITLE_WIDTH)),
            Cell::new(&hit.year),
            Cell::new(&hit.journal),
        ]);
    }
    table
}

/// First `max` characters plus "..." when longer
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly", 7), "exactly");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("αβγδ", 2), "αβ...");
    }

    #[test]
    fn table_has_one_row_per_hit() {
        let hits = vec![
            Candidate {
                pmid: "1".to_string(),
                title: "x".repeat(150),
                ..Default::default()
            },
            Candidate {
                pmid: "2".to_string(),
                ..Default::default()
            },
        ];
        let table = results_table(&hits);
        assert_eq!(table.row_count(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("..."));
    }
}
