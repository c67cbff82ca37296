//! Streaming PubMed XML decoder
//!
//! Reads a gzip archive through quick-xml one event at a time and yields a
//! [`PaperRecord`] per `<PubmedArticle>`. Only the event buffer and the
//! record under construction are held in memory, so peak usage does not
//! grow with archive size.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::record::{PaperRecord, push_unique};

type XmlResult<T> = quick_xml::Result<T>;

/// Lazy record sequence over one archive. Not restartable mid-archive.
///
/// Records without a PMID or without `MedlineCitation`/`Article` are
/// skipped and counted. Malformed text inside one record drops that record
/// only. A syntax or decompression error ends the sequence with `Err`.
pub struct ArchiveDecoder<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    decoded: usize,
    skipped: usize,
    finished: bool,
}

impl ArchiveDecoder<BufReader<GzDecoder<File>>> {
    /// Open a `.xml.gz` archive
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self::new(BufReader::with_capacity(
            256 * 1024,
            GzDecoder::new(file),
        )))
    }
}

impl<'a> ArchiveDecoder<&'a [u8]> {
    /// Decode an already decompressed document
    pub fn from_xml(xml: &'a str) -> Self {
        Self::new(xml.as_bytes())
    }
}

impl<R: BufRead> ArchiveDecoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::new(),
            decoded: 0,
            skipped: 0,
            finished: false,
        }
    }

    /// Records yielded so far
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// Article elements dropped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn skip(&mut self, reason: impl std::fmt::Display) {
        self.skipped += 1;
        log::debug!(
            "Skipping article ending near byte {}: {reason}",
            self.reader.buffer_position()
        );
    }
}

impl<R: BufRead> Iterator for ArchiveDecoder<R> {
    type Item = Result<PaperRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.buf.clear();
            let (is_article, is_eof) = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => (e.name().as_ref() == b"PubmedArticle", false),
                Ok(Event::Eof) => (false, true),
                Ok(_) => (false, false),
                Err(e) => {
                    self.finished = true;
                    let pos = self.reader.buffer_position();
                    return Some(Err(e).with_context(|| format!("XML error near byte {pos}")));
                }
            };

            if is_eof {
                self.finished = true;
                return None;
            }
            if !is_article {
                continue;
            }

            match parse_article(&mut self.reader) {
                Ok(Ok(record)) => {
                    self.decoded += 1;
                    return Some(Ok(record));
                }
                Ok(Err(reason)) => self.skip(reason),
                Err(e) if is_record_local(&e) => self.skip(e),
                Err(e) => {
                    self.finished = true;
                    let pos = self.reader.buffer_position();
                    return Some(Err(e).with_context(|| format!("XML error near byte {pos}")));
                }
            }
        }
    }
}

/// Errors confined to the current record's content; the event stream is
/// still positioned correctly and decoding can go on.
fn is_record_local(e: &quick_xml::Error) -> bool {
    matches!(
        e,
        quick_xml::Error::Escape(_) | quick_xml::Error::Encoding(_) | quick_xml::Error::InvalidAttr(_)
    )
}

/// Accumulates one article while its subtree is read
#[derive(Default)]
struct Draft {
    record: PaperRecord,
    has_citation: bool,
    has_article: bool,
    year: Option<String>,
    medline_date: Option<String>,
    seen_ids: bool,
}

impl Draft {
    /// Enforce the mandatory structure and resolve derived fields
    fn finish(self) -> std::result::Result<PaperRecord, &'static str> {
        if !self.has_citation {
            return Err("no MedlineCitation");
        }
        if !self.has_article {
            return Err("no Article");
        }
        if self.record.pmid.is_empty() {
            return Err("no PMID");
        }

        let mut record = self.record;
        record.year = match (self.year, self.medline_date) {
            (Some(year), _) if !year.is_empty() => year,
            (_, Some(date)) => date.chars().take(4).collect(),
            _ => String::new(),
        };
        Ok(record)
    }
}

/// Outer `Err` is an XML error; inner `Err` names why the article is dropped
fn parse_article<R: BufRead>(
    reader: &mut Reader<R>,
) -> XmlResult<std::result::Result<PaperRecord, &'static str>> {
    let mut draft = Draft::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"MedlineCitation" => {
                    draft.has_citation = true;
                    parse_medline_citation(reader, &mut draft)?;
                }
                b"PubmedData" => parse_pubmed_data(reader, &mut draft)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubmedArticle" => break,
            Event::Eof => return Ok(Err("archive ended inside article")),
            _ => {}
        }
        buf.clear();
    }

    Ok(draft.finish())
}

fn parse_medline_citation<R: BufRead>(reader: &mut Reader<R>, draft: &mut Draft) -> XmlResult<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"PMID" => {
                    let pmid = read_text(reader)?;
                    if draft.record.pmid.is_empty() {
                        draft.record.pmid = pmid;
                    }
                }
                b"Article" => {
                    draft.has_article = true;
                    parse_article_element(reader, draft)?;
                }
                b"MeshHeadingList" => draft.record.mesh_terms = parse_mesh_list(reader)?,
                b"ChemicalList" => draft.record.chemicals = parse_chemical_list(reader)?,
                b"KeywordList" => parse_keyword_list(reader, &mut draft.record.keywords)?,
                // Carry PMIDs of other citations
                b"CommentsCorrectionsList" => skip_element(reader)?,
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"Article" => draft.has_article = true,
            Event::End(e) if e.name().as_ref() == b"MedlineCitation" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_article_element<R: BufRead>(reader: &mut Reader<R>, draft: &mut Draft) -> XmlResult<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Journal" => parse_journal(reader, draft)?,
                b"ArticleTitle" => {
                    let title = read_text(reader)?;
                    if draft.record.title.is_empty() {
                        draft.record.title = title;
                    }
                }
                b"Abstract" => draft.record.abstract_text = parse_abstract(reader)?,
                b"AuthorList" => draft.record.authors = parse_author_list(reader)?,
                b"Language" => {
                    let lang = read_text(reader)?;
                    if !lang.is_empty() {
                        push_unique(&mut draft.record.languages, lang);
                    }
                }
                b"PublicationTypeList" => {
                    parse_pub_type_list(reader, &mut draft.record.pub_types)?
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Article" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_journal<R: BufRead>(reader: &mut Reader<R>, draft: &mut Draft) -> XmlResult<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Title" => draft.record.journal = read_text(reader)?,
                b"Year" => draft.year = Some(read_text(reader)?),
                b"MedlineDate" => draft.medline_date = Some(read_text(reader)?),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Journal" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Space-joined non-empty `AbstractText` segments
fn parse_abstract<R: BufRead>(reader: &mut Reader<R>) -> XmlResult<String> {
    let mut buf = Vec::new();
    let mut parts = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"AbstractText" => {
                let text = read_text(reader)?;
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Event::End(e) if e.name().as_ref() == b"Abstract" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(parts.join(" "))
}

fn parse_author_list<R: BufRead>(reader: &mut Reader<R>) -> XmlResult<Vec<String>> {
    let mut authors = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Author" => {
                if let Some(name) = parse_author(reader)? {
                    authors.push(name);
                }
            }
            Event::End(e) if e.name().as_ref() == b"AuthorList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(authors)
}

/// `"Last Fore"`, or `None` for entries with neither (collective names)
fn parse_author<R: BufRead>(reader: &mut Reader<R>) -> XmlResult<Option<String>> {
    let mut last = String::new();
    let mut fore = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"LastName" => last = read_text(reader)?,
                b"ForeName" => fore = read_text(reader)?,
                b"AffiliationInfo" | b"Identifier" => skip_element(reader)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Author" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if last.is_empty() && fore.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("{last} {fore}").trim().to_string()))
}

fn parse_pub_type_list<R: BufRead>(reader: &mut Reader<R>, types: &mut Vec<String>) -> XmlResult<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"PublicationType" => {
                let value = read_text(reader)?;
                if !value.is_empty() {
                    push_unique(types, value);
                }
            }
            Event::End(e) if e.name().as_ref() == b"PublicationTypeList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_mesh_list<R: BufRead>(reader: &mut Reader<R>) -> XmlResult<Vec<String>> {
    let mut terms = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"MeshHeading" => {
                if let Some(term) = parse_mesh_heading(reader)? {
                    terms.push(term);
                }
            }
            Event::End(e) if e.name().as_ref() == b"MeshHeadingList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(terms)
}

/// `"Descriptor"` or `"Descriptor [Q1, Q2]"`
fn parse_mesh_heading<R: BufRead>(reader: &mut Reader<R>) -> XmlResult<Option<String>> {
    let mut descriptor = String::new();
    let mut qualifiers = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"DescriptorName" => descriptor = read_text(reader)?,
                b"QualifierName" => {
                    let q = read_text(reader)?;
                    if !q.is_empty() {
                        qualifiers.push(q);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"MeshHeading" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if descriptor.is_empty() {
        return Ok(None);
    }
    if qualifiers.is_empty() {
        Ok(Some(descriptor))
    } else {
        Ok(Some(format!("{descriptor} [{}]", qualifiers.join(", "))))
    }
}

fn parse_chemical_list<R: BufRead>(reader: &mut Reader<R>) -> XmlResult<Vec<String>> {
    let mut chemicals = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"NameOfSubstance" => {
                let name = read_text(reader)?;
                if !name.is_empty() {
                    chemicals.push(name);
                }
            }
            Event::End(e) if e.name().as_ref() == b"ChemicalList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(chemicals)
}

/// Appends, since a citation may carry several keyword lists (one per owner)
fn parse_keyword_list<R: BufRead>(reader: &mut Reader<R>, keywords: &mut Vec<String>) -> XmlResult<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Keyword" => {
                let keyword = read_text(reader)?;
                if !keyword.is_empty() {
                    keywords.push(keyword);
                }
            }
            Event::End(e) if e.name().as_ref() == b"KeywordList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_pubmed_data<R: BufRead>(reader: &mut Reader<R>, draft: &mut Draft) -> XmlResult<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"ArticleIdList" if !draft.seen_ids => {
                    draft.seen_ids = true;
                    parse_article_id_list(reader, &mut draft.record)?;
                }
                // Cited works carry their own ArticleIdList
                b"ReferenceList" => skip_element(reader)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubmedData" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_article_id_list<R: BufRead>(reader: &mut Reader<R>, record: &mut PaperRecord) -> XmlResult<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"ArticleId" => {
                let id_type = id_type(&e);
                let value = read_text(reader)?;
                match id_type.as_str() {
                    "doi" if record.doi.is_empty() => record.doi = value,
                    "pmc" if record.pmcid.is_empty() => record.pmcid = value,
                    _ => {}
                }
            }
            Event::End(e) if e.name().as_ref() == b"ArticleIdList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn id_type(e: &BytesStart<'_>) -> String {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"IdType")
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
        .unwrap_or_default()
}

/// Consume the rest of the element whose start tag was just read
fn skip_element<R: BufRead>(reader: &mut Reader<R>) -> XmlResult<()> {
    let mut buf = Vec::new();
    let mut depth = 1usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Text of the element whose start tag was just read, including text of
/// nested markup (`<i>`, `<sup>`), trimmed.
fn read_text<R: BufRead>(reader: &mut Reader<R>) -> XmlResult<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text.trim().to_string())
}
