mod cli;
mod format;
mod repl;

use clap::Parser;
use papers_ollama::OllamaClient;
use papers_rag::{
    Ingestor, PaperTracker, Preparation, QdrantIndex, QueryEngine, RagConfig, Result, Session,
    prepare_collection,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, TrackerCommand, join_words};

const DEFAULT_LOG_FILTER: &str = "warn,papers_rag=info,papers=info";

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match RagConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Command, config: &RagConfig) -> Result<()> {
    match command {
        Command::Ingest { dir, rebuild } => ingest(config, dir, rebuild).await,
        Command::Ask { question, limit } => {
            let limit = limit.map_or(config.search_limit, |n| n as usize);
            ask(config, join_words(&question), limit).await
        }
        Command::Search { query, limit, json } => {
            let limit = limit.map_or(config.search_limit, |n| n as usize);
            search(config, &query.join(" "), limit, json).await
        }
        Command::Status => status(config).await,
        Command::Tracker { cmd } => tracker(config, cmd),
    }
}

async fn ingest(config: &RagConfig, dir: Option<PathBuf>, rebuild: bool) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.markdown_dir.clone());
    let client = config.ollama_client();
    let index = QdrantIndex::from_config(config);
    let mut tracker = PaperTracker::load(&config.tracker_path)?;

    match prepare_collection(&index, &mut tracker, rebuild).await? {
        Preparation::Existing => {}
        Preparation::Rebuilt { forgotten } => println!(
            "Recreated collection {} and forgot {forgotten} processed ids.",
            index.collection()
        ),
        Preparation::Created { forgotten: 0 } => {
            println!("Created collection {}.", index.collection());
        }
        Preparation::Created { forgotten } => println!(
            "Created collection {}. It was missing, so {forgotten} previously processed ids will be ingested again.",
            index.collection()
        ),
    }

    let report = Ingestor::new(&client, &index, &mut tracker, config.embed_dim)
        .ingest_dir(&dir)
        .await?;
    print!("{}", format::ingest_report(&report));
    Ok(())
}

async fn ask(config: &RagConfig, question: Option<String>, limit: usize) -> Result<()> {
    let client = config.ollama_client();
    let index = QdrantIndex::from_config(config);
    index.ensure_collection().await?;
    let engine = QueryEngine::new(&client, &index, &client, config.embed_dim);

    match question {
        Some(question) => {
            let mut session = Session::new();
            let result = engine.ask(&mut session, &question, limit).await?;
            print!("{}", format::query_result(&result));
            Ok(())
        }
        None => repl::run(&engine, limit).await,
    }
}

async fn search(config: &RagConfig, query: &str, limit: usize, json: bool) -> Result<()> {
    let client = config.ollama_client();
    let index = QdrantIndex::from_config(config);
    let engine = QueryEngine::new(&client, &index, &client, config.embed_dim);
    let hits = engine.retrieve(query, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    let matches = papers_rag::query::annotate(hits, &Default::default());
    if matches.is_empty() {
        println!("No papers found.");
    } else {
        print!("{}", format::paper_list(&matches));
        println!("\n{}", papers_rag::relevance_summary(&matches));
    }
    Ok(())
}

async fn status(config: &RagConfig) -> Result<()> {
    let client: OllamaClient = config.ollama_client();
    println!("Ollama  {}", client.base_url());
    match client.list_models().await {
        Ok(models) => {
            for wanted in [client.embed_model(), client.generate_model()] {
                let present = models
                    .iter()
                    .any(|m| m.name == wanted || m.name.strip_suffix(":latest") == Some(wanted));
                let mark = if present { "ok" } else { "missing (run `ollama pull`)" };
                println!("  model {wanted}: {mark}");
            }
        }
        Err(e) => println!("  unreachable: {e}"),
    }

    let index = QdrantIndex::from_config(config);
    println!("Qdrant  {}", config.qdrant_url);
    match index.info().await {
        Ok(Some(info)) => {
            let size = info
                .config
                .params
                .vectors
                .single()
                .map(|p| p.size.to_string())
                .unwrap_or_else(|| "named vectors".to_string());
            let points = match index.count().await {
                Ok(n) => n.to_string(),
                Err(e) => format!("unknown ({e})"),
            };
            println!(
                "  collection {}: {} (vector size {size}, expected {}), {points} points",
                index.collection(),
                info.status,
                config.embed_dim
            );
        }
        Ok(None) => println!("  collection {}: not created yet", index.collection()),
        Err(e) => println!("  unreachable: {e}"),
    }

    let tracker = PaperTracker::load(&config.tracker_path)?;
    println!(
        "Tracker {}: {} processed",
        tracker.path().display(),
        tracker.len()
    );
    Ok(())
}

fn tracker(config: &RagConfig, cmd: TrackerCommand) -> Result<()> {
    let mut tracker = PaperTracker::load(&config.tracker_path)?;
    match cmd {
        TrackerCommand::List { json } => {
            if json {
                let entries: BTreeMap<_, _> = tracker.entries().collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if tracker.is_empty() {
                println!("Nothing processed yet ({}).", tracker.path().display());
            } else {
                for (id, entry) in tracker.entries() {
                    println!("{}", format::tracker_entry(id, entry));
                }
            }
        }
        TrackerCommand::Reset => {
            let n = tracker.len();
            tracker.reset()?;
            println!("Forgot {n} processed ids in {}.", tracker.path().display());
        }
    }
    Ok(())
}
