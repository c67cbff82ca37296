//! Chat-completion client behind `ask`
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint. Answers are
//! streamed as server-sent events and written out fragment by fragment.

use std::io::{BufRead, BufReader, Write};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use litsync_core::{SHARED_RUNTIME, body_reader, http_client};
use litsync_index::Candidate;

use crate::config::LlmConfig;

pub const SYSTEM_PROMPT: &str = "You are an expert research assistant. \
You are provided with a list of academic paper abstracts. \
Your task is to answer the user's query based ONLY on the provided information. \
If the information is not sufficient, state that clearly. \
When referencing a paper, mention its title or index. \
Please answer in the same language as the user's query (or in Chinese if requested).";

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    delta: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// One decoded `data:` line of a streamed completion
#[derive(Debug, PartialEq, Eq)]
enum StreamEvent {
    Fragment(String),
    Done,
}

pub struct Assistant {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl Assistant {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("No LLM API key. Set DEEPSEEK_API_KEY or run `litsync config llm.api_key <key>`")?;
        Ok(Self {
            client: http_client().clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn send(&self, body: serde_json::Value) -> Result<reqwest::Response> {
        let url = self.completions_url();
        SHARED_RUNTIME.handle().block_on(async {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("POST {url}"))?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("LLM request failed with HTTP {status}: {text}");
            }
            Ok(resp)
        })
    }

    /// Best search phrase for `question`; the question itself when the
    /// model is unavailable or answers with nothing.
    pub fn extract_keywords(&self, question: &str) -> String {
        match self.complete(&keyword_prompt(question)) {
            Ok(answer) => {
                let keyword = clean_keyword(&answer);
                if keyword.is_empty() {
                    question.to_string()
                } else {
                    keyword
                }
            }
            Err(e) => {
                log::warn!("Keyword extraction failed ({e:#}); searching with the question");
                question.to_string()
            }
        }
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": &self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        });
        let resp = self.send(body)?;
        let completion: Completion = SHARED_RUNTIME
            .handle()
            .block_on(resp.json())
            .context("malformed completion response")?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .context("completion has no content")
    }

    /// Stream an answer grounded on `papers` into `out`.
    ///
    /// Returns the full answer text.
    pub fn answer(
        &self,
        question: &str,
        papers: &[Candidate],
        out: &mut dyn Write,
    ) -> Result<String> {
        let body = json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_message(question, papers)},
            ],
            "stream": true,
        });
        let resp = self.send(body)?;
        let reader = BufReader::new(body_reader(resp));
        read_stream(reader, out)
    }
}

fn keyword_prompt(question: &str) -> String {
    format!(
        "Extract the most important search keyword or phrase (in English) from the following query: '{question}'. \
Return ONLY the keyword/phrase, without any explanation or quotes."
    )
}

/// Models sometimes wrap the phrase in quotes despite being told not to
fn clean_keyword(answer: &str) -> String {
    answer
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim()
        .to_string()
}

/// User turn: the query followed by a numbered list of candidates
pub fn build_user_message(question: &str, papers: &[Candidate]) -> String {
    let mut msg = format!("User Query: {question}\n\nHere are the candidate papers:\n");
    for (i, paper) in papers.iter().enumerate() {
        msg.push_str(&format!(
            "[{}] Title: {}\nAbstract: {}\n\n",
            i + 1,
            paper.title,
            paper.abstract_text
        ));
    }
    msg
}

fn parse_event(line: &str) -> Option<StreamEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(StreamEvent::Done);
    }
    let chunk: Completion = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            log::debug!("ignoring undecodable stream chunk ({e}): {data}");
            return None;
        }
    };
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|s| !s.is_empty())
        .map(StreamEvent::Fragment)
}

fn read_stream(reader: impl BufRead, out: &mut dyn Write) -> Result<String> {
    let mut answer = String::new();
    for line in reader.lines() {
        let line = line.context("answer stream interrupted")?;
        match parse_event(&line) {
            Some(StreamEvent::Fragment(text)) => {
                out.write_all(text.as_bytes())?;
                out.flush()?;
                answer.push_str(&text);
            }
            Some(StreamEvent::Done) => break,
            None => {}
        }
    }
    writeln!(out)?;
    Ok(answer)
}
