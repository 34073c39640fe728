//! Pipeline tests for the papers-rag crate.
//!
//! These exercise ingest → search → answer end to end using in-memory fakes
//! for the embedder, the vector index and the language model, with markdown
//! fixtures and the tracker file in a temporary directory.

use async_trait::async_trait;
use md5::{Digest, Md5};
use papers_ollama::OllamaError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

use crate::embed::{Embedder, Generator};
use crate::error::{ErrorKind, RagError, Result};
use crate::ingest::{Ingestor, content_id};
use crate::query::QueryEngine;
use crate::session::Session;
use crate::store::VectorIndex;
use crate::tracker::{EntryKind, PaperTracker};
use crate::types::{IngestReport, PaperMetadata, SearchHit, Section};

const DIM: usize = 8;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Deterministic embedder: the vector is derived from the MD5 of the text, so
/// identical text always lands on the identical point. Texts containing
/// `fail_on` are rejected the way an unreachable Ollama would be.
#[derive(Default)]
struct HashEmbedder {
    fail_on: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl HashEmbedder {
    fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Mutex::new(Some(marker.to_string())),
            ..Default::default()
        }
    }

    fn recover(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn hash_vector(text: &str) -> Vec<f32> {
    Md5::digest(text.as_bytes())
        .iter()
        .take(DIM)
        .map(|b| *b as f32 - 127.5)
        .collect()
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(marker) = self.fail_on.lock().unwrap().as_deref() {
            if text.contains(marker) {
                return Err(RagError::Embed(OllamaError::Api {
                    status: 500,
                    message: "model not loaded".into(),
                }));
            }
        }
        Ok(hash_vector(text))
    }
}

/// Embedder with hand-picked vectors; unknown text maps to `fallback`.
struct MapEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

#[async_trait]
impl Embedder for MapEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Brute-force cosine index keyed by paper id.
#[derive(Default)]
struct MemoryIndex {
    points: Mutex<HashMap<String, (Vec<f32>, PaperMetadata)>>,
    upserts: Mutex<usize>,
}

impl MemoryIndex {
    fn len(&self) -> usize {
        self.points.lock().unwrap().len()
    }

    fn upsert_count(&self) -> usize {
        *self.upserts.lock().unwrap()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (na * nb)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: &PaperMetadata) -> Result<()> {
        *self.upserts.lock().unwrap() += 1;
        self.points
            .lock()
            .unwrap()
            .insert(id.to_string(), (vector.to_vec(), metadata.clone()));
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .points
            .lock()
            .unwrap()
            .iter()
            .map(|(id, (v, meta))| SearchHit {
                id: id.clone(),
                score: cosine(vector, v),
                metadata: meta.clone(),
            })
            .collect();
        crate::store::sort_by_score(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.points.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Returns a fixed response and records every prompt it was given.
struct ScriptedGenerator {
    response: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.response.clone())
    }
}

struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Generate(OllamaError::Api {
            status: 503,
            message: "server busy".into(),
        }))
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn write_paper(dir: &Path, file: &str, title: &str, abstract_text: &str) {
    let text = format!("# {title}\n\nSome Author, Another Author\n\n## Abstract\n\n{abstract_text}\n\n## Introduction\n\nBody.\n");
    std::fs::write(dir.join(file), text).unwrap();
}

struct Fixture {
    _tmp: TempDir,
    papers: std::path::PathBuf,
    tracker_path: std::path::PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let papers = tmp.path().join("markdowns");
        std::fs::create_dir(&papers).unwrap();
        let tracker_path = tmp.path().join("state").join("processed_papers.json");
        Self {
            _tmp: tmp,
            papers,
            tracker_path,
        }
    }

    fn with_three_papers() -> Self {
        let f = Self::new();
        write_paper(&f.papers, "01-gnn.md", "Graph Networks", "Message passing over graphs.");
        write_paper(&f.papers, "02-attn.md", "Attention Models", "Self-attention replaces recurrence.");
        write_paper(&f.papers, "03-rl.md", "Policy Gradients", "Reinforcement learning with baselines.");
        f
    }

    fn tracker(&self) -> PaperTracker {
        PaperTracker::load(&self.tracker_path).unwrap()
    }

    async fn ingest(&self, embedder: &dyn Embedder, index: &dyn VectorIndex, dim: usize) -> IngestReport {
        let mut tracker = self.tracker();
        Ingestor::new(embedder, index, &mut tracker, dim)
            .ingest_dir(&self.papers)
            .await
            .unwrap()
    }
}

const COMPLETE_RESPONSE: &str = "SUMMARY:\nGraph networks pass messages.\n\nKEY POINTS:\n- Messages flow along edges\n\nCITATIONS:\n- [{id}]\n\nLIMITATIONS:\nOnly one paper.\n";

// ── Ingestion ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_twice_is_idempotent() {
    let f = Fixture::with_three_papers();
    let embedder = HashEmbedder::default();
    let index = MemoryIndex::default();

    let first = f.ingest(&embedder, &index, DIM).await;
    assert_eq!(first.files_seen, 3);
    assert_eq!(first.papers_ingested, 3);
    assert!(first.failures.is_empty());
    assert_eq!(index.len(), 3);
    assert_eq!(f.tracker().len(), 3);

    let second = f.ingest(&embedder, &index, DIM).await;
    assert_eq!(second.files_seen, 3);
    assert_eq!(second.files_skipped, 3);
    assert_eq!(second.papers_ingested, 0);
    assert_eq!(index.len(), 3);
    assert_eq!(index.upsert_count(), 3);
    assert_eq!(embedder.call_count(), 3);
    assert_eq!(f.tracker().len(), 3);
}

#[tokio::test]
async fn embedding_text_is_title_newline_abstract() {
    let f = Fixture::new();
    write_paper(&f.papers, "a.md", "T", "A");
    let embedder = HashEmbedder::default();
    let index = MemoryIndex::default();
    f.ingest(&embedder, &index, DIM).await;
    assert_eq!(embedder.calls.lock().unwrap().as_slice(), ["T\nA"]);
}

#[tokio::test]
async fn partial_failure_skips_one_paper_and_rerun_retries_it() {
    let f = Fixture::with_three_papers();
    let embedder = HashEmbedder::failing_on("Attention Models");
    let index = MemoryIndex::default();

    let report = f.ingest(&embedder, &index, DIM).await;
    assert_eq!(report.papers_ingested, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].title.as_deref(), Some("Attention Models"));
    assert!(report.failures[0].error.contains("model not loaded"));
    assert_eq!(index.len(), 2);
    assert_eq!(f.tracker().len(), 2);

    embedder.recover();
    let rerun = f.ingest(&embedder, &index, DIM).await;
    assert_eq!(rerun.files_skipped, 2);
    assert_eq!(rerun.papers_ingested, 1);
    assert_eq!(index.len(), 3);
    assert_eq!(f.tracker().len(), 3);
    // The two successful papers were embedded once, the failed one twice.
    assert_eq!(embedder.call_count(), 4);
}

#[tokio::test]
async fn tracker_survives_reload_with_file_ids() {
    let f = Fixture::new();
    write_paper(&f.papers, "a.md", "Graph Networks", "Message passing.");
    let index = MemoryIndex::default();
    f.ingest(&HashEmbedder::default(), &index, DIM).await;

    let bytes = std::fs::read(f.papers.join("a.md")).unwrap();
    let id = content_id(&bytes);
    let tracker = f.tracker();
    assert!(tracker.is_processed(&id));
    let entry = tracker.get(&id).unwrap();
    assert_eq!(entry.kind, EntryKind::Paper);
    assert_eq!(entry.title.as_deref(), Some("Graph Networks"));
    assert!(index.points.lock().unwrap().contains_key(&id));
}

#[tokio::test]
async fn malformed_files_are_skipped() {
    let f = Fixture::new();
    std::fs::write(f.papers.join("empty.md"), "no heading here\n").unwrap();
    std::fs::write(f.papers.join("notes.txt"), "# Not markdown\n\nIgnored.\n").unwrap();
    write_paper(&f.papers, "ok.md", "Good Paper", "Works fine.");
    let index = MemoryIndex::default();

    let report = f.ingest(&HashEmbedder::default(), &index, DIM).await;
    assert_eq!(report.files_seen, 2);
    assert_eq!(report.files_malformed, 1);
    assert_eq!(report.papers_ingested, 1);
    assert_eq!(f.tracker().len(), 1);
}

#[tokio::test]
async fn wrong_dimension_is_a_per_paper_failure() {
    let f = Fixture::with_three_papers();
    let index = MemoryIndex::default();
    let report = f.ingest(&HashEmbedder::default(), &index, DIM + 1).await;
    assert_eq!(report.papers_ingested, 0);
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures[0].error.contains("expected 9"));
    assert!(f.tracker().is_empty());
}

#[tokio::test]
async fn listing_rows_are_tracked_individually() {
    let f = Fixture::new();
    let listing = r##"# Weekly list

<table>
<tbody>
<tr id="Message passing over graphs."><td>1</td><td><a href="#">Graph Networks</a></td></tr>
<tr id="None"><td>2</td><td><a href="#">Missing Abstract</a></td></tr>
<tr id="Self-attention replaces recurrence."><td>3</td><td><a href="#">Attention Models</a></td></tr>
</tbody>
</table>
"##;
    std::fs::write(f.papers.join("list.md"), listing).unwrap();
    let embedder = HashEmbedder::failing_on("Attention Models");
    let index = MemoryIndex::default();

    let report = f.ingest(&embedder, &index, DIM).await;
    assert_eq!(report.papers_ingested, 1);
    assert_eq!(report.rows_without_abstract, 1);
    assert_eq!(report.failures.len(), 1);
    let file_id = content_id(listing.as_bytes());
    // One row failed, so the file itself is not yet done.
    assert!(!f.tracker().is_processed(&file_id));
    assert_eq!(f.tracker().len(), 1);

    embedder.recover();
    let rerun = f.ingest(&embedder, &index, DIM).await;
    assert_eq!(rerun.papers_skipped, 1);
    assert_eq!(rerun.papers_ingested, 1);
    let tracker = f.tracker();
    assert_eq!(tracker.get(&file_id).unwrap().kind, EntryKind::Listing);
    let row_id = content_id(b"Graph Networks\nMessage passing over graphs.");
    assert!(tracker.is_processed(&row_id));
    assert_eq!(index.len(), 2);

    let third = f.ingest(&embedder, &index, DIM).await;
    assert_eq!(third.files_skipped, 1);
}

#[tokio::test]
async fn edited_paper_replaces_its_previous_version() {
    let f = Fixture::new();
    write_paper(&f.papers, "a.md", "Graph Networks", "Message passing.");
    write_paper(&f.papers, "b.md", "Attention Models", "Self-attention.");
    let index = MemoryIndex::default();
    let embedder = HashEmbedder::default();
    f.ingest(&embedder, &index, DIM).await;
    let old_id = content_id(&std::fs::read(f.papers.join("a.md")).unwrap());

    write_paper(&f.papers, "a.md", "Graph Networks", "Message passing, revised.");
    let new_id = content_id(&std::fs::read(f.papers.join("a.md")).unwrap());
    let report = f.ingest(&embedder, &index, DIM).await;

    assert_eq!(report.papers_ingested, 1);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.superseded, 1);
    assert_eq!(index.len(), 2);
    let points = index.points.lock().unwrap();
    assert!(points.contains_key(&new_id));
    assert!(!points.contains_key(&old_id));
    drop(points);
    let tracker = f.tracker();
    assert!(tracker.is_processed(&new_id));
    assert!(!tracker.is_processed(&old_id));
    assert_eq!(tracker.len(), 2);
}

#[tokio::test]
async fn untitled_listing_rows_are_counted() {
    let f = Fixture::new();
    let listing = "<table><tbody>\n<tr id=\"Message passing.\"><td>1</td><td><a href=\"#\">Graph Networks</a></td></tr>\n<tr id=\"Orphan abstract.\"><td>2</td><td></td></tr>\n</tbody></table>\n";
    std::fs::write(f.papers.join("list.md"), listing).unwrap();
    let index = MemoryIndex::default();

    let report = f.ingest(&HashEmbedder::default(), &index, DIM).await;
    assert_eq!(report.papers_ingested, 1);
    assert_eq!(report.rows_without_title, 1);
    assert_eq!(index.len(), 1);
}

// ── Retrieval ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_results_are_in_non_increasing_order() {
    let f = Fixture::with_three_papers();
    write_paper(&f.papers, "04.md", "Diffusion", "Denoising score matching.");
    write_paper(&f.papers, "05.md", "Retrieval", "Dense passage retrieval.");
    let embedder = HashEmbedder::default();
    let index = MemoryIndex::default();
    f.ingest(&embedder, &index, DIM).await;

    let engine = QueryEngine::new(&embedder, &index, &FailingGenerator, DIM);
    let hits = engine.retrieve("anything at all", 10).await.unwrap();
    assert_eq!(hits.len(), 5);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn title_and_abstract_query_round_trips() {
    let f = Fixture::with_three_papers();
    let embedder = HashEmbedder::default();
    let index = MemoryIndex::default();
    f.ingest(&embedder, &index, DIM).await;

    let engine = QueryEngine::new(&embedder, &index, &FailingGenerator, DIM);
    let hits = engine
        .retrieve("Attention Models\nSelf-attention replaces recurrence.", 3)
        .await
        .unwrap();
    assert_eq!(hits[0].metadata.title, "Attention Models");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[0].metadata.source_path.ends_with("02-attn.md"));
}

#[tokio::test]
async fn limit_two_returns_best_two_in_order() {
    let f = Fixture::new();
    write_paper(&f.papers, "a.md", "Close", "a");
    write_paper(&f.papers, "b.md", "Middle", "b");
    write_paper(&f.papers, "c.md", "Far", "c");
    let unit = |cos: f32| vec![cos, (1.0 - cos * cos).sqrt()];
    let embedder = MapEmbedder {
        vectors: HashMap::from([
            ("Close\na".to_string(), unit(0.9)),
            ("Middle\nb".to_string(), unit(0.6)),
            ("Far\nc".to_string(), unit(0.2)),
        ]),
        fallback: vec![1.0, 0.0],
    };
    let index = MemoryIndex::default();
    f.ingest(&embedder, &index, 2).await;

    let engine = QueryEngine::new(&embedder, &index, &FailingGenerator, 2);
    let hits = engine.retrieve("query", 2).await.unwrap();
    let titles: Vec<&str> = hits.iter().map(|h| h.metadata.title.as_str()).collect();
    assert_eq!(titles, vec!["Close", "Middle"]);
    assert!((hits[0].score - 0.9).abs() < 1e-5);
    assert!((hits[1].score - 0.6).abs() < 1e-5);
}

#[tokio::test]
async fn empty_query_is_rejected_before_embedding() {
    let embedder = HashEmbedder::default();
    let index = MemoryIndex::default();
    let engine = QueryEngine::new(&embedder, &index, &FailingGenerator, DIM);
    let err = engine.retrieve("   \n", 3).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyQuery));
    assert_eq!(err.kind(), ErrorKind::Data);
    assert_eq!(embedder.call_count(), 0);
}

// ── Answering ────────────────────────────────────────────────────────────────

async fn single_paper_engine_parts() -> (Fixture, HashEmbedder, MemoryIndex, String) {
    let f = Fixture::new();
    write_paper(&f.papers, "a.md", "Graph Networks", "Message passing over graphs.");
    let embedder = HashEmbedder::default();
    let index = MemoryIndex::default();
    f.ingest(&embedder, &index, DIM).await;
    let id = content_id(&std::fs::read(f.papers.join("a.md")).unwrap());
    (f, embedder, index, id)
}

#[tokio::test]
async fn ask_records_complete_answer() {
    let (_f, embedder, index, id) = single_paper_engine_parts().await;
    let generator = ScriptedGenerator::new(COMPLETE_RESPONSE.replace("{id}", &id));
    let engine = QueryEngine::new(&embedder, &index, &generator, DIM);
    let mut session = Session::new();

    let result = engine.ask(&mut session, "How do graph nets work?", 5).await.unwrap();
    assert!(result.is_complete());
    assert_eq!(result.answer.summary, "Graph networks pass messages.");
    assert_eq!(result.answer.citations, vec![id.clone()]);
    assert!(result.unverified_citations().is_empty());
    assert!(!result.matches[0].previously_shown);

    let prompt = generator.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains(&format!("[{id}] Graph Networks (similarity")));
    assert!(prompt.contains("QUESTION: How do graph nets work?"));

    assert_eq!(session.history.len(), 1);
    assert!(session.shown.contains(&id));
    assert_eq!(session.analytics.queries, 1);

    // The same paper comes back on a second question and is flagged as seen.
    let again = engine.ask(&mut session, "Tell me more", 5).await.unwrap();
    assert!(again.matches[0].previously_shown);
    assert_eq!(session.analytics.repeat_matches, 1);
}

#[tokio::test]
async fn missing_limitations_yields_partial_answer() {
    let (_f, embedder, index, id) = single_paper_engine_parts().await;
    let response = COMPLETE_RESPONSE.replace("{id}", &id);
    let truncated = response.split("LIMITATIONS:").next().unwrap().to_string();
    let generator = ScriptedGenerator::new(truncated);
    let engine = QueryEngine::new(&embedder, &index, &generator, DIM);
    let mut session = Session::new();

    let result = engine.ask(&mut session, "graphs?", 5).await.unwrap();
    assert_eq!(result.missing_sections, vec![Section::Limitations]);
    assert_eq!(result.answer.limitations, "");
    assert_eq!(result.answer.summary, "Graph networks pass messages.");
    assert_eq!(result.answer.key_points, vec!["Messages flow along edges"]);
    assert_eq!(result.answer.citations, vec![id]);
    assert_eq!(session.analytics.partial_answers, 1);
}

#[tokio::test]
async fn hallucinated_citation_is_kept_and_flagged() {
    let (_f, embedder, index, id) = single_paper_engine_parts().await;
    let response = COMPLETE_RESPONSE.replace("{id}", &format!("{id}, deadbeef0000"));
    let generator = ScriptedGenerator::new(response);
    let engine = QueryEngine::new(&embedder, &index, &generator, DIM);
    let mut session = Session::new();

    let result = engine.ask(&mut session, "graphs?", 5).await.unwrap();
    assert_eq!(result.answer.citations, vec![id.clone(), "deadbeef0000".to_string()]);
    assert_eq!(result.unverified_citations(), vec!["deadbeef0000"]);
    assert_eq!(session.analytics.unverified_citations, 1);
    assert!(session.shown.contains("deadbeef0000"));
}

#[tokio::test]
async fn generation_failure_leaves_session_untouched() {
    let (_f, embedder, index, _id) = single_paper_engine_parts().await;
    let engine = QueryEngine::new(&embedder, &index, &FailingGenerator, DIM);
    let mut session = Session::new();

    let err = engine.ask(&mut session, "graphs?", 5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.to_string().contains("server busy"));
    assert!(session.history.is_empty());
    assert!(session.shown.is_empty());
    assert_eq!(session.analytics.queries, 0);

    session.record_failure();
    assert_eq!(session.analytics.failed_queries, 1);
}

#[tokio::test]
async fn unstructured_response_keeps_raw_text() {
    let (_f, embedder, index, _id) = single_paper_engine_parts().await;
    let generator = ScriptedGenerator::new("I am not sure, sorry.");
    let engine = QueryEngine::new(&embedder, &index, &generator, DIM);
    let mut session = Session::new();

    let result = engine.ask(&mut session, "graphs?", 5).await.unwrap();
    assert_eq!(result.missing_sections.len(), 4);
    assert_eq!(result.raw_response, "I am not sure, sorry.");
    assert_eq!(session.history.len(), 1);
}
