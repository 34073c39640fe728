use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload stored next to every vector. `paper_id` maps a hit back to its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub paper_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub source_path: String,
}

/// A paper ready to be written to the vector store.
#[derive(Debug, Clone)]
pub struct PaperRecord {
    pub id: String,
    pub title: String,
    pub abstract_text: String,
    pub source_path: String,
    pub embedding: Vec<f32>,
}

impl PaperRecord {
    pub fn metadata(&self) -> PaperMetadata {
        PaperMetadata {
            paper_id: self.id.clone(),
            title: self.title.clone(),
            abstract_text: self.abstract_text.clone(),
            source_path: self.source_path.clone(),
        }
    }
}

/// One nearest-neighbour result from the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: PaperMetadata,
}

/// A retrieved paper as recorded in a [`QueryResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMatch {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub source_path: String,
    pub score: f32,
    /// Already cited earlier in this session when this query ran.
    pub previously_shown: bool,
}

impl PaperMatch {
    pub fn relevance(&self) -> Relevance {
        Relevance::from_score(self.score)
    }
}

/// Label derived directly from a raw cosine score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Strong,
    Moderate,
    Weak,
    Marginal,
}

impl Relevance {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.75 {
            Relevance::Strong
        } else if score >= 0.55 {
            Relevance::Moderate
        } else if score >= 0.35 {
            Relevance::Weak
        } else {
            Relevance::Marginal
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relevance::Strong => "strong match",
            Relevance::Moderate => "moderate match",
            Relevance::Weak => "weak match",
            Relevance::Marginal => "marginal match",
        })
    }
}

/// The four sections the answer prompt asks the model to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Summary,
    KeyPoints,
    Citations,
    Limitations,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Summary,
        Section::KeyPoints,
        Section::Citations,
        Section::Limitations,
    ];

    /// Header text as it appears in the prompt and in model output.
    pub fn header(self) -> &'static str {
        match self {
            Section::Summary => "SUMMARY",
            Section::KeyPoints => "KEY POINTS",
            Section::Citations => "CITATIONS",
            Section::Limitations => "LIMITATIONS",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Section::Summary => "summary",
            Section::KeyPoints => "key points",
            Section::Citations => "citations",
            Section::Limitations => "limitations",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub summary: String,
    pub key_points: Vec<String>,
    pub citations: Vec<String>,
    pub limitations: String,
}

/// One answered question. Never mutated after it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub matches: Vec<PaperMatch>,
    pub answer: StructuredAnswer,
    /// Sections the model did not produce; empty for a complete answer.
    pub missing_sections: Vec<Section>,
    pub raw_response: String,
    pub timestamp: DateTime<Utc>,
}

impl QueryResult {
    pub fn is_complete(&self) -> bool {
        self.missing_sections.is_empty()
    }

    /// Cited ids that were not among this query's matches. They are kept in the
    /// answer as the model wrote them; callers decide how to present them.
    pub fn unverified_citations(&self) -> Vec<&str> {
        self.answer
            .citations
            .iter()
            .filter(|c| !self.matches.iter().any(|m| &m.id == *c))
            .map(|c| c.as_str())
            .collect()
    }

    pub fn match_for(&self, id: &str) -> Option<&PaperMatch> {
        self.matches.iter().find(|m| m.id == id)
    }

    pub fn top_score(&self) -> Option<f32> {
        self.matches.first().map(|m| m.score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    pub source_path: String,
    pub title: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub files_seen: usize,
    /// Files whose id was already in the tracker.
    pub files_skipped: usize,
    pub files_malformed: usize,
    pub papers_ingested: usize,
    /// Listing rows whose id was already in the tracker.
    pub papers_skipped: usize,
    pub rows_without_abstract: usize,
    /// Listing rows with an abstract but no recognisable title.
    pub rows_without_title: usize,
    /// Tracker ids dropped because a newer version of their file was ingested.
    pub superseded: usize,
    pub failures: Vec<IngestFailure>,
}
