use md5::{Digest, Md5};
use std::path::{Path, PathBuf};

use crate::embed::{Embedder, embed_checked};
use crate::error::Result;
use crate::markdown::{Document, ParsedPaper, parse_document};
use crate::store::{QdrantIndex, VectorIndex};
use crate::tracker::{EntryKind, PaperTracker, ProcessedEntry};
use crate::types::{IngestFailure, IngestReport, PaperRecord};

/// Stable id for a piece of content: the first 12 hex digits of its MD5.
pub fn content_id(bytes: &[u8]) -> String {
    let mut hex = format!("{:x}", Md5::digest(bytes));
    hex.truncate(12);
    hex
}

/// Markdown files directly inside `dir`, sorted by file name.
pub fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("md"));
        if is_md && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// What [`prepare_collection`] did before an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// The collection existed with the right vector size; the tracker is kept.
    Existing,
    /// The collection was missing and has been created. `forgotten` tracker ids
    /// referred to vectors that no longer exist.
    Created { forgotten: usize },
    /// The tracker was cleared and the collection dropped and recreated.
    Rebuilt { forgotten: usize },
}

/// Bring the collection and the tracker into step before ingesting.
///
/// A missing collection means every tracked id is stale, so the tracker is
/// cleared. The tracker is always cleared before the collection is created or
/// emptied: if either step fails, the next run re-embeds rather than skipping
/// papers whose vectors are gone.
pub async fn prepare_collection(
    index: &QdrantIndex,
    tracker: &mut PaperTracker,
    rebuild: bool,
) -> Result<Preparation> {
    if rebuild {
        let forgotten = tracker.len();
        tracker.reset()?;
        index.recreate().await?;
        return Ok(Preparation::Rebuilt { forgotten });
    }

    match index.info().await? {
        Some(info) => {
            index.check_vectors(&info)?;
            Ok(Preparation::Existing)
        }
        None => {
            let forgotten = tracker.len();
            if forgotten > 0 {
                tracing::warn!(
                    collection = %index.collection(),
                    tracked = forgotten,
                    "collection is missing but the tracker is not empty; clearing the tracker"
                );
                tracker.reset()?;
            }
            index.create().await?;
            Ok(Preparation::Created { forgotten })
        }
    }
}

/// Walks a directory of markdown papers into the vector index.
///
/// Per-paper failures (parse, embed, upsert) are logged, recorded in the
/// report and skipped. A failure to persist the tracker aborts the run, since
/// continuing would re-embed everything on the next run.
pub struct Ingestor<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    tracker: &'a mut PaperTracker,
    embed_dim: usize,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        tracker: &'a mut PaperTracker,
        embed_dim: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            tracker,
            embed_dim,
        }
    }

    pub async fn ingest_dir(&mut self, dir: &Path) -> Result<IngestReport> {
        let files = markdown_files(dir)?;
        tracing::info!(dir = %dir.display(), files = files.len(), "ingesting markdown directory");

        let mut report = IngestReport::default();
        for path in &files {
            report.files_seen += 1;
            self.ingest_file(path, &mut report).await?;
        }

        tracing::info!(
            ingested = report.papers_ingested,
            skipped_files = report.files_skipped,
            failures = report.failures.len(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Ingest one file, updating `report`. Only tracker persistence errors are returned.
    pub async fn ingest_file(&mut self, path: &Path, report: &mut IngestReport) -> Result<()> {
        let source = path.display().to_string();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %source, error = %e, "could not read file; skipping");
                report.failures.push(IngestFailure {
                    source_path: source,
                    title: None,
                    error: e.to_string(),
                });
                return Ok(());
            }
        };

        let file_id = content_id(&bytes);
        if self.tracker.is_processed(&file_id) {
            tracing::debug!(path = %source, id = %file_id, "already processed");
            report.files_skipped += 1;
            return Ok(());
        }

        let text = String::from_utf8_lossy(&bytes);
        let document = match parse_document(path, &text) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %source, error = %e, "malformed markdown; skipping");
                report.files_malformed += 1;
                report.failures.push(IngestFailure {
                    source_path: source,
                    title: None,
                    error: e.to_string(),
                });
                return Ok(());
            }
        };

        match document {
            Document::Single(paper) => {
                if self.ingest_paper(&file_id, &paper, &source, report).await {
                    self.tracker
                        .mark_processed(&file_id, ProcessedEntry::paper(&paper.title, &source))?;
                    self.drop_superseded(&file_id, &source, report).await?;
                }
            }
            Document::Listing {
                papers,
                rows_without_abstract,
                rows_without_title,
            } => {
                if rows_without_abstract > 0 {
                    tracing::info!(path = %source, rows = rows_without_abstract, "skipping rows without an abstract");
                }
                report.rows_without_abstract += rows_without_abstract;
                report.rows_without_title += rows_without_title;

                let mut all_ok = true;
                for paper in &papers {
                    let row_id = content_id(paper.embedding_text().as_bytes());
                    if self.tracker.is_processed(&row_id) {
                        report.papers_skipped += 1;
                        continue;
                    }
                    if self.ingest_paper(&row_id, paper, &source, report).await {
                        self.tracker
                            .mark_processed(&row_id, ProcessedEntry::paper(&paper.title, &source))?;
                    } else {
                        all_ok = false;
                    }
                }
                if all_ok {
                    self.tracker
                        .mark_processed(&file_id, ProcessedEntry::listing(&source))?;
                }
            }
        }
        Ok(())
    }

    /// An edited single-paper file gets a new id. Remove what earlier versions
    /// of `source` left in the index and the tracker. A point that cannot be
    /// deleted keeps its tracker entry so it stays visible.
    async fn drop_superseded(
        &mut self,
        current: &str,
        source: &str,
        report: &mut IngestReport,
    ) -> Result<()> {
        for (id, kind) in self.tracker.superseded(source, current) {
            if kind == EntryKind::Paper {
                if let Err(e) = self.index.delete(&id).await {
                    tracing::warn!(id = %id, path = %source, error = %e, "could not delete superseded paper");
                    continue;
                }
            }
            tracing::info!(id = %id, path = %source, "dropped superseded version");
            self.tracker.forget(&id)?;
            report.superseded += 1;
        }
        Ok(())
    }

    /// Embed and upsert one paper. Returns whether it reached the index.
    async fn ingest_paper(
        &self,
        id: &str,
        paper: &ParsedPaper,
        source: &str,
        report: &mut IngestReport,
    ) -> bool {
        match self.store_paper(id, paper, source).await {
            Ok(()) => {
                tracing::info!(id, title = %paper.title, "ingested paper");
                report.papers_ingested += 1;
                true
            }
            Err(e) => {
                tracing::warn!(id, title = %paper.title, error = %e, "failed to ingest paper; skipping");
                report.failures.push(IngestFailure {
                    source_path: source.to_string(),
                    title: Some(paper.title.clone()),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    async fn store_paper(&self, id: &str, paper: &ParsedPaper, source: &str) -> Result<()> {
        let embedding = embed_checked(self.embedder, &paper.embedding_text(), self.embed_dim).await?;
        let record = PaperRecord {
            id: id.to_string(),
            title: paper.title.clone(),
            abstract_text: paper.abstract_text.clone(),
            source_path: source.to_string(),
            embedding,
        };
        self.index
            .upsert(&record.id, &record.embedding, &record.metadata())
            .await
    }
}
