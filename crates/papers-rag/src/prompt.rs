//! Prompt construction for answer generation.

use crate::types::{PaperMatch, Section};

/// Build the generation prompt for `question` over the retrieved `papers`.
///
/// The response schema names the headers [`crate::answer::parse_answer`]
/// looks for, so the two must change together.
pub fn build_prompt(question: &str, papers: &[PaperMatch]) -> String {
    format!(
        r#"You are a research assistant answering questions about academic papers.
Answer using only the papers listed below. If they do not answer the question, say so in the summary.

QUESTION: {question}

PAPERS:
{context}
Respond using exactly these four sections, each header on its own line:

{summary}:
A concise answer to the question in one or two paragraphs.

{key_points}:
- One finding per line, each starting with "- ".

{citations}:
- The ids of the papers you relied on, one per line, in square brackets, e.g. [{example}].
Cite only ids from the list above.

{limitations}:
What the listed papers do not cover or where the evidence is weak.
"#,
        question = question.trim(),
        context = build_context(papers),
        summary = Section::Summary.header(),
        key_points = Section::KeyPoints.header(),
        citations = Section::Citations.header(),
        limitations = Section::Limitations.header(),
        example = papers.first().map(|p| p.id.as_str()).unwrap_or("3f2a9c01b7de"),
    )
}

/// One block per paper: `[id] title (similarity 0.87)` followed by the abstract.
pub fn build_context(papers: &[PaperMatch]) -> String {
    if papers.is_empty() {
        return "(no papers were retrieved)\n".to_string();
    }
    let mut context = String::new();
    for paper in papers {
        context.push_str(&format!(
            "[{}] {} (similarity {:.2})\n{}\n\n",
            paper.id, paper.title, paper.score, paper.abstract_text
        ));
    }
    context
}
