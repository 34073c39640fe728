//! Parse the model's sectioned response into a [`StructuredAnswer`].
//!
//! Parsing never fails outright. Whatever sections were found are returned;
//! sections the model skipped are reported through [`AnswerParseError`] and
//! left empty in the answer.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{Section, StructuredAnswer};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,6}\s*)?(?:\*\*|__)?\s*(summary|key[\s_-]*points|citations|limitations)\s*(?:\*\*|__)?\s*(?::\s*(?:\*\*|__)?\s*(.*?))?\s*$",
    )
    .expect("regex")
});
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s+").expect("regex"));
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("regex"));

/// Sections absent from a model response.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("response is missing sections: {}", list_sections(.missing))]
pub struct AnswerParseError {
    pub missing: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAnswer {
    Complete(StructuredAnswer),
    Partial {
        answer: StructuredAnswer,
        error: AnswerParseError,
    },
}

impl ParsedAnswer {
    pub fn answer(&self) -> &StructuredAnswer {
        match self {
            ParsedAnswer::Complete(answer) | ParsedAnswer::Partial { answer, .. } => answer,
        }
    }

    pub fn missing(&self) -> &[Section] {
        match self {
            ParsedAnswer::Complete(_) => &[],
            ParsedAnswer::Partial { error, .. } => &error.missing,
        }
    }

    pub fn into_parts(self) -> (StructuredAnswer, Vec<Section>) {
        match self {
            ParsedAnswer::Complete(answer) => (answer, Vec::new()),
            ParsedAnswer::Partial { answer, error } => (answer, error.missing),
        }
    }
}

pub fn parse_answer(text: &str) -> ParsedAnswer {
    let mut bodies: HashMap<Section, Vec<&str>> = HashMap::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some(caps) = HEADER.captures(line) {
            let section = section_for(&caps[1]);
            let body = bodies.entry(section).or_default();
            if let Some(inline) = caps.get(2).map(|m| m.as_str()).filter(|s| !s.is_empty()) {
                body.push(inline);
            }
            current = Some(section);
        } else if let Some(section) = current {
            bodies.entry(section).or_default().push(line);
        }
    }

    let missing: Vec<Section> = Section::ALL
        .into_iter()
        .filter(|s| !bodies.contains_key(s))
        .collect();
    let lines = |s: Section| bodies.get(&s).map(Vec::as_slice).unwrap_or_default();

    let answer = StructuredAnswer {
        summary: prose(lines(Section::Summary)),
        key_points: key_points(lines(Section::KeyPoints)),
        citations: citations(lines(Section::Citations)),
        limitations: prose(lines(Section::Limitations)),
    };

    if missing.is_empty() {
        ParsedAnswer::Complete(answer)
    } else {
        ParsedAnswer::Partial {
            answer,
            error: AnswerParseError { missing },
        }
    }
}

fn section_for(name: &str) -> Section {
    let name = name.to_ascii_lowercase();
    if name.starts_with("summary") {
        Section::Summary
    } else if name.starts_with("key") {
        Section::KeyPoints
    } else if name.starts_with("citation") {
        Section::Citations
    } else {
        Section::Limitations
    }
}

/// Lines joined into paragraphs; blank lines separate paragraphs.
fn prose(lines: &[&str]) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}

fn key_points(lines: &[&str]) -> Vec<String> {
    let mut points: Vec<String> = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(m) = BULLET.find(line) {
            let point = line[m.end()..].trim();
            if !point.is_empty() {
                points.push(point.to_string());
            }
        } else if line.starts_with(char::is_whitespace) && !points.is_empty() {
            // Indented continuation of the previous bullet.
            if let Some(last) = points.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
            }
        } else {
            points.push(line.trim().to_string());
        }
    }
    points
}

fn citations(lines: &[&str]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let mut push = |id: &str| {
        let id = clean_id(id);
        let placeholder = id.eq_ignore_ascii_case("none") || id.eq_ignore_ascii_case("n/a");
        if !id.is_empty() && !placeholder && !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    };

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Brackets also hold author names and venues; only id-shaped parts count.
        let mut bracketed = false;
        for caps in BRACKETED.captures_iter(line) {
            for part in caps[1].split([',', ';']) {
                if looks_like_id(part) {
                    bracketed = true;
                    push(part);
                }
            }
        }
        if !bracketed {
            let rest = match BULLET.find(line) {
                Some(m) => &line[m.end()..],
                None => line,
            };
            if let Some(token) = rest.split_whitespace().next() {
                push(token);
            }
        }
    }
    ids
}

fn clean_id(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '`' | '*'))
}

/// A single token of letters, digits and `-`, `_` or `/`.
fn looks_like_id(raw: &str) -> bool {
    let id = clean_id(raw);
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '/')
}

fn list_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.header())
        .collect::<Vec<_>>()
        .join(", ")
}
