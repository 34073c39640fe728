//! Per-conversation state: history, shown papers, analytics, and the
//! interactive command grammar.

use serde::Serialize;
use std::collections::HashSet;

use crate::types::{PaperMatch, QueryResult, Relevance};

#[derive(Debug, Default)]
pub struct ConversationHistory {
    entries: Vec<QueryResult>,
}

impl ConversationHistory {
    pub fn push(&mut self, result: QueryResult) {
        self.entries.push(result);
    }

    /// Up to `n` most recent results, oldest first.
    pub fn recent(&self, n: usize) -> &[QueryResult] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn entries(&self) -> &[QueryResult] {
        &self.entries
    }

    pub fn last(&self) -> Option<&QueryResult> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Paper ids already cited in this session. Used to annotate, never to filter.
#[derive(Debug, Default)]
pub struct ShownSet {
    ids: HashSet<String>,
}

impl ShownSet {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub queries: u64,
    pub failed_queries: u64,
    pub papers_retrieved: u64,
    pub citations: u64,
    pub unverified_citations: u64,
    /// Matches that had already been cited earlier in the session.
    pub repeat_matches: u64,
    pub partial_answers: u64,
    /// Queries that retrieved at least one paper.
    pub scored_queries: u64,
    pub top_score_sum: f64,
}

impl Analytics {
    fn record(&mut self, result: &QueryResult) {
        self.queries += 1;
        self.papers_retrieved += result.matches.len() as u64;
        self.citations += result.answer.citations.len() as u64;
        self.unverified_citations += result.unverified_citations().len() as u64;
        self.repeat_matches += result.matches.iter().filter(|m| m.previously_shown).count() as u64;
        if !result.is_complete() {
            self.partial_answers += 1;
        }
        if let Some(top) = result.top_score() {
            self.scored_queries += 1;
            self.top_score_sum += f64::from(top);
        }
    }

    /// Mean best-match score over queries that retrieved something.
    pub fn average_top_score(&self) -> Option<f64> {
        (self.scored_queries > 0).then(|| self.top_score_sum / self.scored_queries as f64)
    }
}

#[derive(Debug, Default)]
pub struct Session {
    pub history: ConversationHistory,
    pub shown: ShownSet,
    pub analytics: Analytics,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished query: history, shown citations, analytics.
    pub fn record(&mut self, result: QueryResult) {
        self.analytics.record(&result);
        self.shown.extend(result.answer.citations.iter().cloned());
        self.history.push(result);
    }

    pub fn record_failure(&mut self) {
        self.analytics.failed_queries += 1;
    }

    /// Forget history and shown papers. Analytics cover the whole session and are kept.
    pub fn clear(&mut self) {
        self.history.clear();
        self.shown.clear();
    }
}

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Analytics,
    Clear,
    History,
    Help,
    Limit(usize),
    /// `limit` with a missing, zero, or non-numeric argument.
    InvalidLimit(String),
    Ask(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        match line.to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => return Command::Quit,
            "analytics" => return Command::Analytics,
            "clear" => return Command::Clear,
            "history" => return Command::History,
            "help" | "?" => return Command::Help,
            _ => {}
        }
        let mut words = line.split_whitespace();
        if words
            .next()
            .is_some_and(|w| w.eq_ignore_ascii_case("limit"))
        {
            let arg: Vec<&str> = words.collect();
            return match arg.as_slice() {
                [n] => match n.parse::<usize>() {
                    Ok(n) if n > 0 => Command::Limit(n),
                    _ => Command::InvalidLimit((*n).to_string()),
                },
                // "limit" followed by several words reads as a question.
                [_, _, ..] => Command::Ask(line.to_string()),
                [] => Command::InvalidLimit(String::new()),
            };
        }
        Command::Ask(line.to_string())
    }
}

pub const HELP: &str = "\
Commands:
  <question>   ask a question about the ingested papers
  limit N      retrieve N papers per question
  history      list questions asked this session
  analytics    show session statistics
  clear        forget history and previously shown papers
  help         show this message
  quit         leave (also: exit, q)";

/// One-line description of how well the retrieved set matches the query.
pub fn relevance_summary(matches: &[PaperMatch]) -> String {
    if matches.is_empty() {
        return "No papers matched this query.".to_string();
    }
    let count = |r: Relevance| matches.iter().filter(|m| m.relevance() == r).count();
    let strong = count(Relevance::Strong);
    let moderate = count(Relevance::Moderate);
    let weak = count(Relevance::Weak) + count(Relevance::Marginal);
    let repeats = matches.iter().filter(|m| m.previously_shown).count();

    let mut parts = Vec::new();
    if strong > 0 {
        parts.push(format!("{strong} strong"));
    }
    if moderate > 0 {
        parts.push(format!("{moderate} moderate"));
    }
    if weak > 0 {
        parts.push(format!("{weak} weak"));
    }
    let mut summary = format!(
        "{} paper{} retrieved ({})",
        matches.len(),
        if matches.len() == 1 { "" } else { "s" },
        parts.join(", ")
    );
    if repeats > 0 {
        summary.push_str(&format!(", {repeats} seen earlier"));
    }
    if strong == 0 {
        summary.push_str("; the collection may not cover this question well");
    }
    summary.push('.');
    summary
}
