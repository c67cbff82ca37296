//! Remote archive listing
//!
//! Parses the HTML directory index served for the PubMed baseline and
//! returns the `.xml.gz` archives in name order, which doubles as the
//! ingestion order.

use anyhow::{Context, Result};
use litsync_core::SHARED_RUNTIME;

/// Suffix of the archives we ingest
pub const ARCHIVE_SUFFIX: &str = ".xml.gz";

/// One archive offered by the remote directory index. Identity is the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    /// Size printed next to the link (`19M`, `4.5K`), approximate
    pub size_hint: Option<u64>,
}

impl RemoteFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_hint: None,
        }
    }

    /// Absolute URL of this file under `base_url`
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.name)
    }
}

/// Issue one GET against the directory index and parse it.
///
/// No retry here: callers log the failure and stop the sync.
pub fn fetch_listing(client: &reqwest::Client, base_url: &str) -> Result<Vec<RemoteFile>> {
    let html = SHARED_RUNTIME.handle().block_on(async {
        client
            .get(base_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("Failed to fetch directory index")?
            .text()
            .await
            .context("Failed to read directory index body")
    })?;
    Ok(parse_html_listing(&html))
}

/// Parse HTML directory listing for archive links
pub fn parse_html_listing(html: &str) -> Vec<RemoteFile> {
    let mut files = Vec::new();

    // Lines look like: <a href="pubmed26n0001.xml.gz">pubmed26n0001.xml.gz</a>     2026-01-29 14:48   19M
    for line in html.lines() {
        for (start, _) in line.match_indices("href=\"") {
            let rest = &line[start + 6..];
            let Some(end) = rest.find('"') else {
                continue;
            };
            let target = &rest[..end];
            let name = target.rsplit('/').next().unwrap_or(target);

            // .md5 companions end in ".xml.gz.md5" and fall out here
            if name.ends_with(ARCHIVE_SUFFIX) && name.len() > ARCHIVE_SUFFIX.len() {
                files.push(RemoteFile {
                    name: name.to_string(),
                    size_hint: parse_size_from_line(line),
                });
            }
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    files.dedup_by(|a, b| a.name == b.name);
    files
}

/// Parse size from HTML line (e.g., "19M" or "4.5K")
fn parse_size_from_line(line: &str) -> Option<u64> {
    line.split_whitespace().rev().find_map(parse_size_string)
}

fn parse_size_string(s: &str) -> Option<u64> {
    let s = s.trim();

    if s.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('K') {
        (n, 1024u64)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1024 * 1024 * 1024)
    } else if s.chars().all(|c| c.is_ascii_digit()) {
        (s, 1)
    } else {
        return None;
    };

    num_str
        .parse::<f64>()
        .ok()
        .map(|n| (n * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
<html>
<head><title>Index of /pubmed/baseline</title></head>
<body>
<h1>Index of /pubmed/baseline</h1>
<pre>Name                     Last modified      Size
<a href="pubmed26n0002.xml.gz">pubmed26n0002.xml.gz</a>     2026-01-29 14:48   17M
<a href="pubmed26n0001.xml.gz.md5">pubmed26n0001.xml.gz.md5</a> 2026-01-29 14:48   60
<a href="pubmed26n0001.xml.gz">pubmed26n0001.xml.gz</a>     2026-01-29 14:48   19M
<a href="README.txt">README.txt</a>     2026-01-29 14:48   4.5K
</pre>
</body>
</html>"#;

    #[test]
    fn keeps_only_archives_sorted() {
        let files = parse_html_listing(SAMPLE_HTML);
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["pubmed26n0001.xml.gz", "pubmed26n0002.xml.gz"]);
    }

    #[test]
    fn size_hints_from_listing() {
        let files = parse_html_listing(SAMPLE_HTML);
        assert_eq!(files[0].size_hint, Some(19 * 1024 * 1024));
        assert_eq!(files[1].size_hint, Some(17 * 1024 * 1024));
    }

    #[test]
    fn several_links_on_one_line() {
        let html = r#"<a href="b.xml.gz">b</a> <a href="a.xml.gz">a</a><a href="a.xml.gz">dup</a>"#;
        let files = parse_html_listing(html);
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.xml.gz", "b.xml.gz"]);
    }

    #[test]
    fn absolute_link_targets() {
        let html = r#"<a href="/pubmed/baseline/pubmed26n0003.xml.gz">x</a>"#;
        let files = parse_html_listing(html);
        assert_eq!(files[0].name, "pubmed26n0003.xml.gz");
    }

    #[test]
    fn bare_suffix_is_not_an_archive() {
        assert!(parse_html_listing(r#"<a href=".xml.gz">x</a>"#).is_empty());
    }

    #[test]
    fn empty_listing() {
        assert!(parse_html_listing("<html><body>nothing here</body></html>").is_empty());
    }

    #[test]
    fn url_construction() {
        let file = RemoteFile::new("pubmed26n0001.xml.gz");
        assert_eq!(
            file.url("https://ftp.ncbi.nlm.nih.gov/pubmed/baseline/"),
            "https://ftp.ncbi.nlm.nih.gov/pubmed/baseline/pubmed26n0001.xml.gz"
        );
        assert_eq!(
            file.url("https://example.com/path"),
            "https://example.com/path/pubmed26n0001.xml.gz"
        );
    }

    #[test]
    fn parse_size() {
        assert_eq!(parse_size_string("19M"), Some(19 * 1024 * 1024));
        assert_eq!(parse_size_string("4.5K"), Some((4.5 * 1024.0) as u64));
        assert_eq!(parse_size_string("1G"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size_string("100"), Some(100));
    }

    #[test]
    fn parse_size_invalid() {
        assert!(parse_size_string("").is_none());
        assert!(parse_size_string("abc").is_none());
        assert!(parse_size_string("12X").is_none());
    }
}
