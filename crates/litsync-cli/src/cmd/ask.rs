//! Ask subcommand - answer a question from retrieved abstracts

use anyhow::Result;
use clap::Args;

use litsync_index::{Candidate, VectorIndex};

use super::open_index;
use crate::assistant::Assistant;
use crate::config::Config;

const CANDIDATES: usize = 10;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Question in any language
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,
}

pub fn run(args: AskArgs, config: &Config) -> Result<()> {
    let question = args.question.join(" ");
    let assistant = Assistant::new(&config.llm)?;

    let keyword = assistant.extract_keywords(&question);
    log::info!("Search keyword: {keyword}");

    let papers = retrieve(config, &question, &keyword)?;
    if papers.is_empty() {
        eprintln!("No relevant papers found for '{keyword}'");
        return Ok(());
    }
    eprintln!("Answering from {} papers...\n", papers.len());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    assistant.answer(&question, &papers, &mut out)?;
    Ok(())
}

/// Semantic hits for the full question, else keyword hits for the
/// extracted phrase
fn retrieve(config: &Config, question: &str, keyword: &str) -> Result<Vec<Candidate>> {
    let store = config.data.store_path();
    if let Some(index) = open_index(config) {
        match index.query(question, CANDIDATES) {
            Ok(hits) if !hits.is_empty() => return Ok(hits),
            Ok(_) => log::info!("Semantic search found nothing; trying keyword search"),
            Err(e) => log::warn!("Semantic search failed ({e}); trying keyword search"),
        }
    }
    litsync_index::keyword_search(&store, keyword, CANDIDATES)
}
