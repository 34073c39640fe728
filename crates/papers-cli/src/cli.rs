use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "papers",
    about = "Ask questions about a local collection of academic papers",
    after_help = "Services are configured through environment variables: QDRANT_URL, OLLAMA_URL, \
                  PAPERS_EMBED_MODEL, PAPERS_LLM_MODEL, PAPERS_MARKDOWN_DIR, PAPERS_TRACKER_PATH, ..."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Embed markdown papers into the vector store
    Ingest {
        /// Directory of markdown files (default: $PAPERS_MARKDOWN_DIR or ./markdowns)
        dir: Option<PathBuf>,
        /// Drop the collection and forget processed papers before ingesting
        #[arg(long)]
        rebuild: bool,
    },
    /// Answer a question; starts an interactive session when no question is given
    Ask {
        /// Question text
        question: Vec<String>,
        /// Papers to retrieve per question
        #[arg(long, short = 'n', value_parser = clap::value_parser!(u32).range(1..))]
        limit: Option<u32>,
    },
    /// List the papers closest to a query without generating an answer
    Search {
        /// Query text
        #[arg(required = true)]
        query: Vec<String>,
        /// Number of papers to return
        #[arg(long, short = 'n', value_parser = clap::value_parser!(u32).range(1..))]
        limit: Option<u32>,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that Ollama and Qdrant are reachable and configured
    Status,
    /// Inspect or reset the record of processed papers
    Tracker {
        #[command(subcommand)]
        cmd: TrackerCommand,
    },
}

#[derive(Subcommand)]
pub enum TrackerCommand {
    /// List processed ids
    List {
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget every processed id (vectors already stored are kept)
    Reset,
}

/// Words given on the command line, joined back into one string.
pub fn join_words(words: &[String]) -> Option<String> {
    let text = words.join(" ");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
