//! Email context scraped from the visible message list row

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::{ContextSource, EmailContext};
use crate::dom::{HoverTarget, Page, closest, text_of};

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .map(|css| Selector::parse(css).expect("valid extraction selector"))
        .collect()
}

static ROW: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&["tr.zA", r#"[role="row"]"#, ".zA"]));
static SENDER: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&[".yW span", ".zF", "[email]"]));
static SUBJECT_AROUND_TARGET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".bog").expect("valid extraction selector"));
static SUBJECT: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&[".y6 span:not(.T6)", ".bog", ".bqe"]));
static SNIPPET: LazyLock<Vec<Selector>> =
    LazyLock::new(|| selectors(&[".y2", ".xY .xW span"]));

/// Build a context from the row enclosing `target`.
///
/// `None` when no enclosing row exists or every field comes up empty.
pub fn extract_from_ui(page: &Page, target: HoverTarget) -> Option<EmailContext> {
    let el = page.element(target)?;
    let Some(row) = ROW.iter().find_map(|sel| closest(el, sel)) else {
        tracing::debug!("No message row around hover target");
        return None;
    };

    let from = first_text(row, &SENDER, |el| el.value().attr("email"));
    let subject = closest(el, &SUBJECT_AROUND_TARGET)
        .map(text_of)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| first_text(row, &SUBJECT, |_| None));
    let snippet = first_text(row, &SNIPPET, |_| None);

    let context = EmailContext {
        from,
        subject,
        body_excerpt: snippet,
        source: ContextSource::Page,
    };
    (!context.is_empty()).then_some(context)
}

/// First non-empty text under `row`, trying selectors in order
fn first_text<'a>(
    row: ElementRef<'a>,
    candidates: &[Selector],
    fallback: impl Fn(ElementRef<'a>) -> Option<&'a str>,
) -> String {
    candidates
        .iter()
        .flat_map(|sel| row.select(sel))
        .find_map(|el| {
            let text = text_of(el);
            if !text.is_empty() {
                return Some(text);
            }
            fallback(el)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}
