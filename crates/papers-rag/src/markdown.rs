//! Extract titles and abstracts from paper markdown.
//!
//! Two layouts are recognised. A listing file embeds an HTML table whose
//! `<tr>` rows carry the abstract in their `id` attribute and the title as the
//! link text in the second cell. Any other file is treated as a single paper:
//! the first heading is the title and the abstract is the body of an
//! "Abstract" section, a paragraph prefixed with `Abstract:`, or failing both
//! the first paragraph after the title.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{RagError, Result};

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody tr").expect("selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("selector"));

static ABSTRACT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^abstract\s*[:.]\s*").expect("regex"));
static ABSTRACT_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^abstract\s*:?$").expect("regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPaper {
    pub title: String,
    pub abstract_text: String,
}

impl ParsedPaper {
    /// Text handed to the embedder: title and abstract on separate lines.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.abstract_text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Single(ParsedPaper),
    Listing {
        papers: Vec<ParsedPaper>,
        rows_without_abstract: usize,
        rows_without_title: usize,
    },
}

/// Parse one markdown file. `path` is only used for error messages.
pub fn parse_document(path: &Path, text: &str) -> Result<Document> {
    match find_tbody(text) {
        Some(table) => parse_listing(path, table),
        None => parse_single(path, text).map(Document::Single),
    }
}

// ── Listing tables ─────────────────────────────────────────────────────

/// Slice covering the first `<tbody>` element, end tag included when present.
fn find_tbody(text: &str) -> Option<&str> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let start = lower.find("<tbody")?;
    let end = lower[start..]
        .find("</tbody>")
        .map(|i| start + i + "</tbody>".len())
        .unwrap_or(text.len());
    Some(&text[start..end])
}

fn parse_listing(path: &Path, tbody: &str) -> Result<Document> {
    // A bare <tbody> outside <table> is dropped by the HTML tree builder.
    let html = Html::parse_fragment(&format!("<table>{tbody}</table>"));
    let mut papers = Vec::new();
    let mut rows_without_abstract = 0;
    let mut rows_without_title = 0;
    let mut rows = 0;

    for row in html.select(&ROW) {
        rows += 1;
        let abstract_text = normalize(row.value().attr("id").unwrap_or_default());
        if abstract_text.is_empty() || abstract_text == "None" {
            rows_without_abstract += 1;
            continue;
        }
        let Some(title) = row_title(row) else {
            tracing::warn!(path = %path.display(), row = rows, "listing row has no title; skipping");
            rows_without_title += 1;
            continue;
        };
        papers.push(ParsedPaper {
            title,
            abstract_text,
        });
    }

    if rows == 0 {
        return Err(malformed(path, "table body has no rows"));
    }
    Ok(Document::Listing {
        papers,
        rows_without_abstract,
        rows_without_title,
    })
}

fn row_title(row: ElementRef<'_>) -> Option<String> {
    let from_cell = row.select(&CELL).nth(1).and_then(|cell| {
        cell.select(&LINK)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .or_else(|| Some(element_text(cell)))
    });
    from_cell
        .filter(|t| !t.is_empty())
        .or_else(|| row.select(&LINK).next().map(element_text))
        .filter(|t| !t.is_empty())
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize(&el.text().collect::<String>())
}

// ── Single papers ──────────────────────────────────────────────────────

struct Paragraph {
    text: String,
    in_abstract_section: bool,
    after_title: bool,
}

fn parse_single(path: &Path, text: &str) -> Result<ParsedPaper> {
    let mut title: Option<String> = None;
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut buf = String::new();
    let mut in_heading = false;
    let mut in_paragraph = false;
    let mut in_abstract_section = false;

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                in_heading = true;
                buf.clear();
            }
            Event::End(TagEnd::Heading(_)) => {
                in_heading = false;
                let heading = normalize(&buf);
                if title.is_none() && !heading.is_empty() && !ABSTRACT_HEADING.is_match(&heading) {
                    title = Some(heading);
                    in_abstract_section = false;
                } else {
                    in_abstract_section = ABSTRACT_HEADING.is_match(&heading);
                }
            }
            Event::Start(Tag::Paragraph) if !in_heading => {
                in_paragraph = true;
                buf.clear();
            }
            Event::End(TagEnd::Paragraph) if in_paragraph => {
                in_paragraph = false;
                let text = normalize(&buf);
                if !text.is_empty() {
                    paragraphs.push(Paragraph {
                        text,
                        in_abstract_section,
                        after_title: title.is_some(),
                    });
                }
            }
            Event::Text(t) | Event::Code(t) if in_heading || in_paragraph => buf.push_str(&t),
            Event::SoftBreak | Event::HardBreak if in_heading || in_paragraph => buf.push(' '),
            _ => {}
        }
    }

    let title = title.ok_or_else(|| malformed(path, "no title heading"))?;
    let abstract_text =
        find_abstract(&paragraphs).ok_or_else(|| malformed(path, "no abstract paragraph"))?;
    Ok(ParsedPaper {
        title,
        abstract_text,
    })
}

fn find_abstract(paragraphs: &[Paragraph]) -> Option<String> {
    let section: Vec<&str> = paragraphs
        .iter()
        .filter(|p| p.in_abstract_section)
        .map(|p| p.text.as_str())
        .collect();
    if !section.is_empty() {
        return Some(section.join(" "));
    }

    let prefixed = paragraphs.iter().find_map(|p| {
        ABSTRACT_PREFIX
            .find(&p.text)
            .map(|m| p.text[m.end()..].to_string())
            .filter(|rest| !rest.is_empty())
    });
    if prefixed.is_some() {
        return prefixed;
    }

    paragraphs
        .iter()
        .find(|p| p.after_title)
        .map(|p| p.text.clone())
}

fn malformed(path: &Path, reason: &str) -> RagError {
    RagError::malformed(path.display().to_string(), reason)
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
