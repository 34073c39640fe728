use chrono::Utc;

use crate::answer::{ParsedAnswer, parse_answer};
use crate::embed::{Embedder, Generator, embed_checked};
use crate::error::{RagError, Result};
use crate::prompt::build_prompt;
use crate::session::{Session, ShownSet};
use crate::store::VectorIndex;
use crate::types::{PaperMatch, QueryResult, SearchHit};

/// Answers questions against an index: embed, search, prompt, generate, parse.
pub struct QueryEngine<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    generator: &'a dyn Generator,
    embed_dim: usize,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        generator: &'a dyn Generator,
        embed_dim: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            embed_dim,
        }
    }

    /// Nearest papers to `query`, best first. No language model is involved.
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        let vector = embed_checked(self.embedder, query, self.embed_dim).await?;
        let hits = self.index.search(&vector, limit).await?;
        tracing::debug!(query, hits = hits.len(), "retrieved papers");
        Ok(hits)
    }

    /// Answer `query` and record the result in `session`.
    ///
    /// On error nothing is recorded; the caller decides whether to count the
    /// failure with [`Session::record_failure`].
    pub async fn ask(&self, session: &mut Session, query: &str, limit: usize) -> Result<QueryResult> {
        let hits = self.retrieve(query, limit).await?;
        let matches = annotate(hits, &session.shown);

        let prompt = build_prompt(query, &matches);
        let raw_response = self.generator.generate(&prompt).await?;
        let parsed = parse_answer(&raw_response);
        if let ParsedAnswer::Partial { error, .. } = &parsed {
            tracing::warn!(%error, "model response was incomplete");
        }
        let (answer, missing_sections) = parsed.into_parts();

        let result = QueryResult {
            query: query.trim().to_string(),
            matches,
            answer,
            missing_sections,
            raw_response,
            timestamp: Utc::now(),
        };
        let unverified = result.unverified_citations();
        if !unverified.is_empty() {
            tracing::warn!(ids = ?unverified, "model cited papers that were not retrieved");
        }
        session.record(result.clone());
        Ok(result)
    }
}

/// Convert hits to matches, flagging ids already shown this session.
pub fn annotate(hits: Vec<SearchHit>, shown: &ShownSet) -> Vec<PaperMatch> {
    hits.into_iter()
        .map(|hit| PaperMatch {
            previously_shown: shown.contains(&hit.id),
            id: hit.id,
            title: hit.metadata.title,
            abstract_text: hit.metadata.abstract_text,
            source_path: hit.metadata.source_path,
            score: hit.score,
        })
        .collect()
}
