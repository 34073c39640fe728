//! Plain-text rendering for terminal output.

use papers_rag::{
    Analytics, ConversationHistory, EntryKind, IngestReport, PaperMatch, ProcessedEntry,
    QueryResult, Section, relevance_summary,
};
use std::fmt::Write;

const PREVIEW_CHARS: usize = 200;
const RULE: &str = "================================================================================";

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| if l.is_empty() { String::new() } else { format!("  {l}") })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full display of one answered question: answer sections, then papers.
pub fn query_result(result: &QueryResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nAnswer\n{RULE}");
    out.push_str(&answer(result));
    let _ = writeln!(out, "\nRelevant papers\n{RULE}");
    out.push_str(&paper_list(&result.matches));
    let _ = writeln!(out, "\n{}", relevance_summary(&result.matches));
    out
}

pub fn answer(result: &QueryResult) -> String {
    let mut out = String::new();
    if result.missing_sections.len() == Section::ALL.len() {
        // Nothing recognisable came back; show the model's own words.
        let _ = writeln!(out, "{}", result.raw_response.trim());
        return out;
    }

    let a = &result.answer;
    if !a.summary.is_empty() {
        let _ = writeln!(out, "Summary:\n{}\n", indent(&a.summary));
    }
    if !a.key_points.is_empty() {
        let _ = writeln!(out, "Key points:");
        for point in &a.key_points {
            let _ = writeln!(out, "  - {point}");
        }
        out.push('\n');
    }
    if !a.citations.is_empty() {
        let _ = writeln!(out, "Citations:");
        for id in &a.citations {
            match result.match_for(id) {
                Some(m) => {
                    let _ = writeln!(out, "  [{id}] {}", m.title);
                }
                None => {
                    let _ = writeln!(out, "  [{id}] (not among the retrieved papers)");
                }
            }
        }
        out.push('\n');
    }
    if !a.limitations.is_empty() {
        let _ = writeln!(out, "Limitations:\n{}\n", indent(&a.limitations));
    }
    if !result.missing_sections.is_empty() {
        let missing: Vec<&str> = result.missing_sections.iter().map(|s| s.header()).collect();
        let _ = writeln!(out, "(The response had no {} section.)", missing.join(", "));
    }
    out
}

pub fn paper_list(matches: &[PaperMatch]) -> String {
    let mut out = String::new();
    for (i, m) in matches.iter().enumerate() {
        let seen = if m.previously_shown { "  [seen earlier]" } else { "" };
        let _ = writeln!(out, "\n{}. {}{seen}", i + 1, m.title);
        let _ = writeln!(out, "   id: {}  score: {:.3} ({})", m.id, m.score, m.relevance());
        let _ = writeln!(out, "   source: {}", m.source_path);
        let _ = writeln!(out, "   {}", preview(&m.abstract_text, PREVIEW_CHARS));
    }
    out
}

pub fn ingest_report(report: &IngestReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Ingested {} paper{} from {} file{}.",
        report.papers_ingested,
        plural(report.papers_ingested),
        report.files_seen,
        plural(report.files_seen)
    );
    if report.files_skipped + report.papers_skipped > 0 {
        let _ = writeln!(
            out,
            "Already processed: {} file{}, {} listing row{}.",
            report.files_skipped,
            plural(report.files_skipped),
            report.papers_skipped,
            plural(report.papers_skipped)
        );
    }
    if report.rows_without_abstract > 0 {
        let _ = writeln!(out, "Listing rows without an abstract: {}.", report.rows_without_abstract);
    }
    if report.rows_without_title > 0 {
        let _ = writeln!(out, "Listing rows without a title: {}.", report.rows_without_title);
    }
    if report.superseded > 0 {
        let _ = writeln!(out, "Replaced earlier versions: {}.", report.superseded);
    }
    if !report.failures.is_empty() {
        let _ = writeln!(out, "Failed ({}):", report.failures.len());
        for f in &report.failures {
            match &f.title {
                Some(title) => {
                    let _ = writeln!(out, "  {} ({title}): {}", f.source_path, f.error);
                }
                None => {
                    let _ = writeln!(out, "  {}: {}", f.source_path, f.error);
                }
            }
        }
    }
    out
}

pub fn analytics(a: &Analytics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Questions answered:    {}", a.queries);
    let _ = writeln!(out, "Questions failed:      {}", a.failed_queries);
    let _ = writeln!(out, "Papers retrieved:      {}", a.papers_retrieved);
    let _ = writeln!(out, "Repeat matches:        {}", a.repeat_matches);
    let _ = writeln!(out, "Citations:             {}", a.citations);
    let _ = writeln!(out, "Unverified citations:  {}", a.unverified_citations);
    let _ = writeln!(out, "Incomplete answers:    {}", a.partial_answers);
    match a.average_top_score() {
        Some(avg) => {
            let _ = writeln!(out, "Average top score:     {avg:.3}");
        }
        None => {
            let _ = writeln!(out, "Average top score:     -");
        }
    }
    out
}

pub fn history(history: &ConversationHistory) -> String {
    if history.is_empty() {
        return "No questions yet.\n".to_string();
    }
    let mut out = String::new();
    for (i, r) in history.entries().iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. [{}] {} ({} paper{}, {} citation{})",
            i + 1,
            r.timestamp.format("%H:%M:%S"),
            r.query,
            r.matches.len(),
            plural(r.matches.len()),
            r.answer.citations.len(),
            plural(r.answer.citations.len())
        );
    }
    out
}

pub fn tracker_entry(id: &str, entry: &ProcessedEntry) -> String {
    let kind = match entry.kind {
        EntryKind::Paper => "paper",
        EntryKind::Listing => "listing",
    };
    let label = entry.title.as_deref().unwrap_or(&entry.source_path);
    format!(
        "{id}  {kind:<7}  {}  {label}",
        entry.processed_at.format("%Y-%m-%d %H:%M")
    )
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
