//! Record store: one JSON `PaperRecord` per line
//!
//! The store is a derived artifact. `decode_all` rebuilds it from scratch
//! out of every archive in sorted-name order, so two runs over the same
//! archives produce byte-identical files. A PMID is written once per run:
//! the first occurrence in archive order wins and later repeats are
//! counted as skipped.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rustc_hash::FxHashSet;

use litsync_core::{ProgressContext, fmt_num, is_shutdown_requested};

use crate::codec::ArchiveDecoder;
use crate::manifest::ARCHIVE_SUFFIX;
use crate::record::PaperRecord;

/// Tally of one `decode_all` run
#[derive(Debug, Default)]
pub struct ParseSummary {
    /// Archives opened
    pub files: usize,
    /// Records written to the store
    pub records: usize,
    /// Article elements dropped as malformed or as repeated PMIDs
    pub skipped: usize,
    /// Of `skipped`, records whose PMID was already written this run
    pub duplicates: usize,
    /// Archives that ended with a decode error (records before it are kept)
    pub failed_files: Vec<String>,
}

/// Buffered line writer with atomic tmp→rename
pub struct StoreWriter {
    writer: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    line_count: usize,
}

impl std::fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWriter")
            .field("final_path", &self.final_path)
            .field("line_count", &self.line_count)
            .finish_non_exhaustive()
    }
}

impl StoreWriter {
    /// Start a fresh store next to `final_path`; a stale tmp file is replaced
    pub fn create(final_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = tmp_path_for(final_path);
        let file = File::create(&tmp_path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(1024 * 1024, file),
            tmp_path,
            final_path: final_path.to_path_buf(),
            line_count: 0,
        })
    }

    pub fn write_record(&mut self, record: &PaperRecord) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.line_count += 1;
        Ok(())
    }

    /// Flush, sync and rename over the final path
    pub fn finalize(self) -> std::io::Result<usize> {
        let line_count = self.line_count;
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(line_count)
    }

    /// Drop the partial output, leaving any previous store untouched
    pub fn discard(self) -> std::io::Result<()> {
        let tmp_path = self.tmp_path.clone();
        drop(self);
        fs::remove_file(tmp_path)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Archives under `dir` in sorted-name order
pub fn list_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(format!("*{ARCHIVE_SUFFIX}"));
    let pattern = pattern
        .to_str()
        .with_context(|| format!("non-UTF-8 path: {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = glob::glob(pattern)
        .context("invalid archive pattern")?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Unreadable entry: {e}");
                None
            }
        })
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Rebuild the store at `store_path` from every archive in `archive_dir`.
///
/// A corrupt archive is logged and recorded in the summary; records decoded
/// before the fault are kept and the run continues with the next archive.
/// On shutdown the partial output is discarded and the previous store stays.
pub fn decode_all(
    archive_dir: &Path,
    store_path: &Path,
    progress: &ProgressContext,
) -> Result<ParseSummary> {
    let archives = list_archives(archive_dir)?;
    if archives.is_empty() {
        log::warn!("No archives in {}", archive_dir.display());
    }

    let mut writer = StoreWriter::create(store_path)
        .with_context(|| format!("create {}", store_path.display()))?;
    let mut summary = ParseSummary::default();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let pb = progress.stage_line("parse");

    for path in &archives {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_message(format!("{name} ({} records)", fmt_num(summary.records)));

        let mut decoder = match ArchiveDecoder::open(path) {
            Ok(d) => d,
            Err(e) => {
                log::error!("{name}: {e:#}");
                summary.failed_files.push(name);
                continue;
            }
        };
        summary.files += 1;

        for result in decoder.by_ref() {
            if is_shutdown_requested() {
                pb.finish_and_clear();
                writer.discard().ok();
                bail!("Interrupted while parsing {name}; previous store kept");
            }
            match result {
                Ok(record) if seen.contains(&record.pmid) => {
                    log::debug!("{name}: PMID {} already written, skipped", record.pmid);
                    summary.duplicates += 1;
                    summary.skipped += 1;
                }
                Ok(record) => {
                    writer
                        .write_record(&record)
                        .with_context(|| format!("write {}", store_path.display()))?;
                    summary.records += 1;
                    seen.insert(record.pmid);
                }
                Err(e) => {
                    log::error!("{name}: {e:#}");
                    summary.failed_files.push(name.clone());
                }
            }
        }

        summary.skipped += decoder.skipped();
        log::info!(
            "{name}: {} records, {} skipped",
            fmt_num(decoder.decoded()),
            decoder.skipped()
        );
    }

    pb.finish_and_clear();
    writer
        .finalize()
        .with_context(|| format!("finalize {}", store_path.display()))?;

    log::info!(
        "Parsed {} archives into {} records ({} skipped)",
        summary.files,
        fmt_num(summary.records),
        summary.skipped
    );
    Ok(summary)
}
