//! Application-wide constants for tuning and configuration
//!
//! Centralizes magic numbers and user-facing strings so they stay discoverable.

/// Debounce delay for hover-entry events in milliseconds.
/// Coalesces rapid pointer movement into one orchestration per settled hover.
pub const HOVER_DEBOUNCE_MS: u64 = 300;

/// Identifiers shorter than this are too weak to trust for a remote fetch.
pub const MIN_IDENTIFIER_LEN: usize = 10;

/// Maximum characters of email context sent to the summarizer.
pub const SUMMARY_INPUT_MAX_CHARS: usize = 4000;

/// Maximum characters of the local fallback summary.
pub const FALLBACK_SUMMARY_MAX_CHARS: usize = 150;

/// Appended to any text cut at one of the caps above.
pub const TRUNCATION_MARKER: &str = "...";

/// Separator between the fields of an assembled email context.
pub const CONTEXT_SEPARATOR: &str = " | ";

/// Vertical gap in pixels between the hovered element and the overlay.
pub const OVERLAY_GAP_PX: f64 = 5.0;

/// Number of recent messages listed when resolving a fetch.
pub const RECENT_MESSAGES_LIMIT: u32 = 10;

/// Minimum share of alphabet characters before a base64 decode is attempted.
pub const ENCODED_ALPHABET_RATIO: f64 = 0.95;

// === Overlay texts ===

pub const LOADING_TEXT: &str = "Loading summary...";

pub const SUMMARIZING_TEXT: &str = "Summarizing...";

pub const UNIDENTIFIED_TEXT: &str = "Unable to identify this email or extract its content.";

pub const OPEN_EMAIL_TEXT: &str = "Cannot identify email. Try opening it.";

pub const EXTRACTION_FAILED_TEXT: &str = "Could not extract email content for summarization.";
