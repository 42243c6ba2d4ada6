//! Human-readable email context for the summarizer
//!
//! Two independent strategies: scraping the visible row (`ui`) or reading a
//! structured message from the store (`payload`). A context is always built
//! from exactly one of them.

mod payload;
mod ui;

pub use payload::{MessagePayload, context_from_payload};
pub use ui::extract_from_ui;

use crate::constants::CONTEXT_SEPARATOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    Page,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContext {
    pub from: String,
    pub subject: String,
    pub body_excerpt: String,
    pub source: ContextSource,
}

impl EmailContext {
    pub fn is_empty(&self) -> bool {
        self.from.is_empty() && self.subject.is_empty() && self.body_excerpt.is_empty()
    }

    /// `From: <from> | Subject: <subject> | <body>`, skipping empty fields
    pub fn render(&self) -> String {
        let mut fields = Vec::with_capacity(3);
        if !self.from.is_empty() {
            fields.push(format!("From: {}", self.from));
        }
        if !self.subject.is_empty() {
            fields.push(format!("Subject: {}", self.subject));
        }
        if !self.body_excerpt.is_empty() {
            fields.push(self.body_excerpt.clone());
        }
        fields.join(CONTEXT_SEPARATOR)
    }
}
