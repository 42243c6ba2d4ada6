//! Text shaping around the summarizer call

use crate::constants::{FALLBACK_SUMMARY_MAX_CHARS, SUMMARY_INPUT_MAX_CHARS, TRUNCATION_MARKER};

/// Collapse whitespace runs to single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max` characters, with the marker appended if anything was cut
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Summarizer input: collapsed and capped
pub fn prepare_input(context: &str) -> String {
    truncate_chars(&collapse_whitespace(context), SUMMARY_INPUT_MAX_CHARS)
}

/// Local stand-in for a summary: the trailing `|` segment of the context,
/// capped at a short length. The marker follows any segment that reaches the
/// cap, even when nothing was cut.
pub fn fallback_summary(context: &str) -> String {
    let segment = context.rsplit('|').next().unwrap_or_default().trim();
    let capped: String = segment.chars().take(FALLBACK_SUMMARY_MAX_CHARS).collect();
    if capped.chars().count() >= FALLBACK_SUMMARY_MAX_CHARS {
        format!("{capped}{TRUNCATION_MARKER}")
    } else {
        capped
    }
}
