//! Prompt templates for the summarization backend

use crate::types::{SummaryKind, SummaryLength};

fn length_instruction(length: SummaryLength) -> &'static str {
    match length {
        SummaryLength::Short => "Keep it to one or two sentences.",
        SummaryLength::Medium => "Keep it to a single short paragraph.",
        SummaryLength::Detailed => {
            "Cover all substantive points; multiple paragraphs are fine."
        }
    }
}

/// Build the (system, user) message pair for a summarize call
pub fn build_prompt(
    text: &str,
    kind: SummaryKind,
    length: SummaryLength,
    query: Option<&str>,
) -> (String, String) {
    let system = match kind {
        SummaryKind::Abstractive => format!(
            "You summarize notes for an AI agent's long-term memory. \
             Write an abstractive summary in your own words. {} \
             Reply with the summary only.",
            length_instruction(length)
        ),
        SummaryKind::Extractive => format!(
            "You summarize notes for an AI agent's long-term memory. \
             Extract the most important sentences verbatim. {} \
             Reply with the extracted sentences only.",
            length_instruction(length)
        ),
        SummaryKind::QueryFocused => format!(
            "You summarize notes for an AI agent's long-term memory. \
             Summarize only the material relevant to this question: {:?}. {} \
             Reply with the summary only.",
            query.unwrap_or_default(),
            length_instruction(length)
        ),
    };

    (system, text.to_string())
}
