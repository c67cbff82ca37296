//! Checkpointed store → index loading
//!
//! The checkpoint counts store lines, not records: skipped lines advance it
//! too, so its value is a position in the file independent of how many
//! lines were usable. It is written strictly after the batch it covers has
//! been accepted. A crash between the two replays that batch; upsert by id
//! makes the replay harmless (at-least-once).
//!
//! Ids are unique within one upsert: a PMID repeated inside a batch
//! replaces the earlier entry in place and counts as skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

use litsync_core::{ProgressContext, fmt_num, shutdown_flag};
use litsync_pubmed::PaperRecord;

use crate::checkpoint::IndexCheckpoint;
use crate::vector::{DocMetadata, VectorIndex, document_text};

/// Tally of one `index_incremental` run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    /// Checkpoint found at start
    pub start_line: u64,
    /// Lines read past the checkpoint
    pub lines_read: u64,
    /// Records sent to the index
    pub indexed: usize,
    /// Lines that were malformed, had no PMID, no text, or repeated a
    /// PMID already in the same batch
    pub skipped: usize,
    /// Upsert calls issued
    pub batches: usize,
    /// Checkpoint persisted at the end
    pub checkpoint: u64,
    /// Stopped early by a shutdown request
    pub interrupted: bool,
}

/// Records accumulated for the next upsert
#[derive(Default)]
struct Batch {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<DocMetadata>,
    slots: FxHashMap<String, usize>,
}

impl Batch {
    /// Add `record`, or overwrite the entry with the same PMID.
    ///
    /// Returns `false` when an entry was overwritten.
    fn push(&mut self, record: &PaperRecord) -> bool {
        if let Some(&slot) = self.slots.get(&record.pmid) {
            self.documents[slot] = document_text(record);
            self.metadatas[slot] = DocMetadata::from_record(record);
            return false;
        }
        self.slots.insert(record.pmid.clone(), self.ids.len());
        self.ids.push(record.pmid.clone());
        self.documents.push(document_text(record));
        self.metadatas.push(DocMetadata::from_record(record));
        true
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.documents.clear();
        self.metadatas.clear();
        self.slots.clear();
    }
}

/// Why a store line is not indexed
fn parse_line(line: &[u8]) -> std::result::Result<PaperRecord, String> {
    let record: PaperRecord = serde_json::from_slice(line).map_err(|e| e.to_string())?;
    if record.pmid.trim().is_empty() {
        return Err("no pmid".to_string());
    }
    if !record.has_text() {
        return Err("no title or abstract".to_string());
    }
    Ok(record)
}

/// Index every store line past the checkpoint, `batch_size` records per
/// upsert. Stops at the next line boundary on shutdown.
pub fn index_incremental(
    index: &dyn VectorIndex,
    store: &Path,
    batch_size: usize,
    progress: &ProgressContext,
) -> Result<IndexSummary> {
    index_with_cancel(index, store, batch_size, progress, shutdown_flag())
}

/// [`index_incremental`] with an explicit cancellation flag
pub fn index_with_cancel(
    index: &dyn VectorIndex,
    store: &Path,
    batch_size: usize,
    progress: &ProgressContext,
    cancel: &AtomicBool,
) -> Result<IndexSummary> {
    anyhow::ensure!(batch_size > 0, "batch size must be at least 1");

    let checkpoint = IndexCheckpoint::for_store(store);
    let start = checkpoint.load();
    let mut summary = IndexSummary {
        start_line: start,
        checkpoint: start,
        ..Default::default()
    };

    let file = File::open(store).with_context(|| format!("open {}", store.display()))?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut line = Vec::new();
    let mut line_no: u64 = 0;

    while line_no < start {
        line.clear();
        if reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("read {}", store.display()))?
            == 0
        {
            break;
        }
        line_no += 1;
    }
    if line_no < start {
        log::warn!(
            "Checkpoint {start} is past the end of {} ({line_no} lines); nothing to index",
            store.display()
        );
        return Ok(summary);
    }
    if start > 0 {
        log::info!("Resuming after line {}", fmt_num(start as usize));
    }

    let total = count_lines(store).unwrap_or(start);
    let pb = progress.line_bar("index", total, start);
    let mut batch = Batch::default();

    loop {
        if cancel.load(Ordering::Relaxed) {
            summary.interrupted = true;
            log::warn!(
                "Shutdown requested; {} unsent records dropped, checkpoint stays at {}",
                batch.len(),
                summary.checkpoint
            );
            pb.abandon_with_message("interrupted");
            return Ok(summary);
        }

        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("read {} after line {line_no}", store.display()))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        summary.lines_read += 1;
        pb.inc(1);

        match parse_line(trim_newline(&line)) {
            Ok(record) => {
                if !batch.push(&record) {
                    summary.skipped += 1;
                    log::debug!(
                        "{}:{line_no}: PMID {} repeated within the batch, replaced",
                        store.display(),
                        record.pmid
                    );
                }
            }
            Err(reason) => {
                summary.skipped += 1;
                log::debug!("{}:{line_no}: skipped ({reason})", store.display());
            }
        }

        if batch.len() >= batch_size {
            flush(index, &mut batch, &mut summary, line_no)?;
            persist(&checkpoint, line_no, &mut summary);
        }
    }

    if !batch.is_empty() {
        flush(index, &mut batch, &mut summary, line_no)?;
    }
    if line_no > summary.checkpoint {
        persist(&checkpoint, line_no, &mut summary);
    }
    pb.finish_and_clear();

    log::info!(
        "Indexed {} records in {} batches ({} skipped), checkpoint at line {}",
        fmt_num(summary.indexed),
        summary.batches,
        summary.skipped,
        fmt_num(summary.checkpoint as usize)
    );
    Ok(summary)
}

fn flush(
    index: &dyn VectorIndex,
    batch: &mut Batch,
    summary: &mut IndexSummary,
    line_no: u64,
) -> Result<()> {
    index
        .upsert(&batch.ids, &batch.documents, &batch.metadatas)
        .with_context(|| {
            format!(
                "upsert of {} records ending at line {line_no} failed",
                batch.len()
            )
        })?;
    summary.indexed += batch.len();
    summary.batches += 1;
    batch.clear();
    Ok(())
}

/// A failed checkpoint write costs a replay on the next run, never data
fn persist(checkpoint: &IndexCheckpoint, line_no: u64, summary: &mut IndexSummary) {
    match checkpoint.save(line_no) {
        Ok(()) => summary.checkpoint = line_no,
        Err(e) => log::error!("{e:#}"),
    }
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn count_lines(path: &Path) -> std::io::Result<u64> {
    let mut reader = BufReader::with_capacity(1024 * 1024, File::open(path)?);
    let mut count = 0u64;
    let mut ends_with_newline = true;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        count += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        ends_with_newline = buf.last() == Some(&b'\n');
        let len = buf.len();
        reader.consume(len);
    }
    if !ends_with_newline {
        count += 1;
    }
    Ok(count)
}

/// Forget indexing progress and empty the index
pub fn reset(index: &dyn VectorIndex, store: &Path) -> Result<()> {
    IndexCheckpoint::for_store(store).remove()?;
    index.reset().context("index reset failed")?;
    log::info!("Index and checkpoint reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_line_reasons() {
        assert!(parse_line(br#"{"pmid":"1","title":"T"}"#).is_ok());
        assert!(parse_line(br#"{"pmid":"1","abstract":"A"}"#).is_ok());
        assert_eq!(
            parse_line(br#"{"title":"T"}"#).unwrap_err(),
            "no pmid"
        );
        assert_eq!(
            parse_line(br#"{"pmid":"1","title":" "}"#).unwrap_err(),
            "no title or abstract"
        );
        assert!(parse_line(b"{truncated").is_err());
        assert!(parse_line(b"\xff\xfe").is_err());
        assert!(parse_line(b"").is_err());
    }

    #[test]
    fn batch_replaces_repeated_pmid() {
        let record = |pmid: &str, title: &str| PaperRecord {
            pmid: pmid.to_string(),
            title: title.to_string(),
            ..Default::default()
        };
        let mut batch = Batch::default();
        assert!(batch.push(&record("1", "old")));
        assert!(batch.push(&record("2", "other")));
        assert!(!batch.push(&record("1", "new")));

        assert_eq!(batch.ids, ["1", "2"]);
        assert!(batch.documents[0].contains("new"));
        assert_eq!(batch.metadatas[0].title, "new");

        batch.clear();
        assert!(batch.is_empty());
        assert!(batch.push(&record("1", "again")));
    }

    #[test]
    fn trims_line_endings() {
        assert_eq!(trim_newline(b"abc\r\n"), b"abc");
        assert_eq!(trim_newline(b"abc\n"), b"abc");
        assert_eq!(trim_newline(b"abc"), b"abc");
    }

    #[test]
    fn counts_lines_with_and_without_final_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"a\nb\nc")
            .unwrap();
        assert_eq!(count_lines(&path).unwrap(), 3);
        std::fs::write(&path, b"a\nb\n").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 2);
        std::fs::write(&path, b"").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 0);
    }
}
