use papers_rag::session::HELP;
use papers_rag::{Command, QueryEngine, Result, Session};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::format;

/// Interactive question loop. Returns on `quit` or end of input.
pub async fn run(engine: &QueryEngine<'_>, mut limit: usize) -> Result<()> {
    let mut session = Session::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask a question about your papers. Type 'help' for commands, 'quit' to leave.");
    loop {
        print!("\nquestion> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match Command::parse(&line) {
            Command::Quit => break,
            Command::Empty => {}
            Command::Help => println!("{HELP}"),
            Command::Analytics => print!("{}", format::analytics(&session.analytics)),
            Command::History => print!("{}", format::history(&session.history)),
            Command::Clear => {
                session.clear();
                println!("Cleared history and previously shown papers.");
            }
            Command::Limit(n) => {
                limit = n;
                println!("Retrieving {n} papers per question.");
            }
            Command::InvalidLimit(arg) => {
                eprintln!("limit needs a positive number, got {arg:?}");
            }
            Command::Ask(question) => match engine.ask(&mut session, &question, limit).await {
                Ok(result) => print!("{}", format::query_result(&result)),
                Err(e) => {
                    session.record_failure();
                    tracing::warn!(kind = ?e.kind(), "query failed");
                    eprintln!("Query failed: {e}");
                }
            },
        }
    }
    Ok(())
}
