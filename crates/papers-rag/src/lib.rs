pub mod answer;
pub mod config;
pub mod error;
pub mod ingest;
pub mod markdown;
pub mod prompt;
pub mod query;
pub mod session;
pub mod store;
pub mod tracker;
pub mod types;

mod embed;

pub use answer::{AnswerParseError, ParsedAnswer, parse_answer};
pub use config::RagConfig;
pub use embed::{Embedder, Generator};
pub use error::{ErrorKind, RagError, Result};
pub use ingest::{Ingestor, Preparation, content_id, prepare_collection};
pub use query::QueryEngine;
pub use session::{Analytics, Command, ConversationHistory, Session, ShownSet, relevance_summary};
pub use store::{QdrantIndex, VectorIndex};
pub use tracker::{EntryKind, PaperTracker, ProcessedEntry};
pub use types::*;

#[cfg(test)]
mod tests;
