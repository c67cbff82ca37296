//! Archive directory → record store

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use litsync_core::ProgressContext;
use litsync_pubmed::{ArchiveDecoder, PaperRecord, decode_all};

fn article(pmid: &str, title: &str) -> String {
    format!(
        "<PubmedArticle><MedlineCitation><PMID Version=\"1\">{pmid}</PMID><Article>\
         <Journal><Title>J</Title><JournalIssue><PubDate><Year>2020</Year></PubDate></JournalIssue></Journal>\
         <ArticleTitle>{title}</ArticleTitle>\
         <Abstract><AbstractText>About {title}.</AbstractText></Abstract>\
         </Article></MedlineCitation></PubmedArticle>"
    )
}

fn gzip(xml: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(xml.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn write_archive(dir: &Path, name: &str, articles: &[String]) {
    let xml = format!(
        "<?xml version=\"1.0\"?>\n<PubmedArticleSet>\n{}\n</PubmedArticleSet>\n",
        articles.join("\n")
    );
    fs::write(dir.join(name), gzip(&xml)).unwrap();
}

fn read_store(path: &Path) -> Vec<PaperRecord> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn archives_decoded_in_sorted_name_order() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir(&raw).unwrap();
    write_archive(&raw, "pubmed26n0002.xml.gz", &[article("3", "C")]);
    write_archive(
        &raw,
        "pubmed26n0001.xml.gz",
        &[article("1", "A"), article("2", "B")],
    );
    let store = dir.path().join("metadata.jsonl");

    let summary = decode_all(&raw, &store, &ProgressContext::hidden()).unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.skipped, 0);
    assert!(summary.failed_files.is_empty());
    let pmids: Vec<_> = read_store(&store).into_iter().map(|r| r.pmid).collect();
    assert_eq!(pmids, ["1", "2", "3"]);
}

#[test]
fn rerun_reproduces_identical_store() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir(&raw).unwrap();
    write_archive(&raw, "a.xml.gz", &[article("10", "X"), article("11", "Y")]);
    let store = dir.path().join("metadata.jsonl");
    let progress = ProgressContext::hidden();

    decode_all(&raw, &store, &progress).unwrap();
    let first = fs::read(&store).unwrap();
    // Leftovers from an interrupted run must not leak into the new store
    fs::write(dir.path().join("metadata.jsonl.tmp"), b"garbage\n").unwrap();
    decode_all(&raw, &store, &progress).unwrap();
    let second = fs::read(&store).unwrap();

    assert_eq!(first, second);
    assert!(!dir.path().join("metadata.jsonl.tmp").exists());
}

#[test]
fn previous_store_is_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir(&raw).unwrap();
    write_archive(&raw, "a.xml.gz", &[article("1", "A")]);
    let store = dir.path().join("metadata.jsonl");
    fs::write(&store, "{\"pmid\":\"old\"}\n{\"pmid\":\"older\"}\n").unwrap();

    decode_all(&raw, &store, &ProgressContext::hidden()).unwrap();

    let pmids: Vec<_> = read_store(&store).into_iter().map(|r| r.pmid).collect();
    assert_eq!(pmids, ["1"]);
}

#[test]
fn corrupt_archive_is_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir(&raw).unwrap();
    write_archive(&raw, "a.xml.gz", &[article("1", "A")]);
    // Cut the gzip stream mid-way
    let full = gzip(&format!(
        "<PubmedArticleSet>{}</PubmedArticleSet>",
        (0..200)
            .map(|i| article(&format!("b{i}"), "filler text to make the stream long"))
            .collect::<String>()
    ));
    fs::write(raw.join("b.xml.gz"), &full[..full.len() / 2]).unwrap();
    write_archive(&raw, "c.xml.gz", &[article("3", "C")]);
    let store = dir.path().join("metadata.jsonl");

    let summary = decode_all(&raw, &store, &ProgressContext::hidden()).unwrap();

    assert_eq!(summary.failed_files, ["b.xml.gz"]);
    let pmids: Vec<_> = read_store(&store).into_iter().map(|r| r.pmid).collect();
    assert_eq!(pmids.first().map(String::as_str), Some("1"));
    assert_eq!(pmids.last().map(String::as_str), Some("3"));
    // Records decoded before the fault are kept
    assert!(pmids.len() > 2);
}

#[test]
fn malformed_articles_are_counted() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir(&raw).unwrap();
    write_archive(
        &raw,
        "a.xml.gz",
        &[
            article("1", "A"),
            "<PubmedArticle><MedlineCitation><Article/></MedlineCitation></PubmedArticle>"
                .to_string(),
            article("2", "B"),
        ],
    );
    let store = dir.path().join("metadata.jsonl");

    let summary = decode_all(&raw, &store, &ProgressContext::hidden()).unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.skipped, 1);
}

#[test]
fn empty_archive_dir_writes_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("metadata.jsonl");

    let summary = decode_all(dir.path(), &store, &ProgressContext::hidden()).unwrap();

    assert_eq!(summary.files, 0);
    assert_eq!(fs::read_to_string(&store).unwrap(), "");
}

#[test]
fn decoder_reads_gzip_archive() {
    let dir = tempfile::tempdir().unwrap();
    write_archive(dir.path(), "a.xml.gz", &[article("5", "E")]);

    let records: Vec<_> = ArchiveDecoder::open(&dir.path().join("a.xml.gz"))
        .unwrap()
        .collect::<anyhow::Result<_>>()
        .unwrap();

    assert_eq!(records.len(), 1);
    let r: &PaperRecord = &records[0];
    assert_eq!(r.pmid, "5");
    assert_eq!(r.journal, "J");
    assert_eq!(r.year, "2020");
    assert_eq!(r.abstract_text, "About E.");
}

#[test]
fn repeated_pmid_keeps_first_occurrence() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir(&raw).unwrap();
    write_archive(&raw, "a.xml.gz", &[article("1", "First"), article("2", "B")]);
    write_archive(&raw, "b.xml.gz", &[article("1", "Second"), article("3", "C")]);
    let store = dir.path().join("metadata.jsonl");

    let summary = decode_all(&raw, &store, &ProgressContext::hidden()).unwrap();

    let records = read_store(&store);
    let pmids: Vec<_> = records.iter().map(|r| r.pmid.as_str()).collect();
    assert_eq!(pmids, ["1", "2", "3"]);
    assert_eq!(records[0].title, "First");
    assert_eq!(summary.records, 3);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.skipped, 1);
}

#[test]
fn repeated_pmid_within_one_archive() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir(&raw).unwrap();
    write_archive(&raw, "a.xml.gz", &[article("7", "X"), article("7", "Y")]);
    let store = dir.path().join("metadata.jsonl");

    let summary = decode_all(&raw, &store, &ProgressContext::hidden()).unwrap();

    assert_eq!(read_store(&store).len(), 1);
    assert_eq!(summary.duplicates, 1);
}
