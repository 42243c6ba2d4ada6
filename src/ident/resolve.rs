//! Best-effort search of the page URL and DOM for the hovered email's identifier
//!
//! Each strategy is a pure function of the page and the target. The resolver
//! runs them in priority order and stops at the first accepted candidate.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::constants::MIN_IDENTIFIER_LEN;
use crate::dom::{HoverTarget, Page};

pub const THREAD_PREFIX: &str = "thread-f:";

const THREAD_ATTR: &str = "data-thread-id";
const LEGACY_ATTR: &str = "data-legacy-message-id";
const MESSAGE_ATTR: &str = "data-message-id";
const LEGACY_THREAD_ATTR: &str = "data-legacy-thread-id";

/// Query parameters naming the open thread, in priority order
const THREAD_PARAMS: [&str; 2] = ["threadId", "th"];

/// Row id prefixes the message list uses for conversation rows
const ROW_ID_PREFIXES: [&str; 2] = [":m", ":t"];

static HASH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"thread-f:(\d+)",
        r"#(?:inbox|category/\w+|label/[^/]+)/([a-zA-Z0-9]+)(?:\?|$)",
        r"#(?:inbox|category/\w+|label/[^/]+)/thread/([a-zA-Z0-9]+)(?:\?|$)",
        r"f:(\d+)",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("valid url hash regex"))
    .collect()
});

static URL_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[&#](?:th|msg)=([a-zA-Z0-9._-]+)").expect("valid url token regex"));

static ANY_ID_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-thread-id], [data-legacy-message-id], [data-message-id]")
        .expect("valid id attribute selector")
});

/// Candidate collection order for the proximity search
static CANDIDATE_SELECTORS: LazyLock<[Selector; 3]> = LazyLock::new(|| {
    [LEGACY_ATTR, MESSAGE_ATTR, THREAD_ATTR]
        .map(|attr| Selector::parse(&format!("[{attr}]")).expect("valid id attribute selector"))
});

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr[id]").expect("valid row selector"));

/// Prefix a bare id with the thread marker, leaving marked ids alone
pub fn with_thread_prefix(id: &str) -> String {
    if id.contains(THREAD_PREFIX) {
        id.to_string()
    } else {
        format!("{THREAD_PREFIX}{id}")
    }
}

/// Too short to trust for a remote fetch
pub fn is_weak(id: &str) -> bool {
    id.chars().count() < MIN_IDENTIFIER_LEN
}

type Strategy = fn(&Resolver<'_>, HoverTarget) -> Option<String>;

const STRATEGIES: [(&str, Strategy); 5] = [
    ("url-hash", from_url_hash),
    ("url-query", from_url_query),
    ("nearest-attribute", from_nearest_attribute),
    ("url-pattern", from_url_pattern),
    ("row-id", from_row_ids),
];

pub struct Resolver<'p> {
    page: &'p Page,
    min_len: usize,
}

impl<'p> Resolver<'p> {
    /// Accepts any non-empty candidate
    pub fn new(page: &'p Page) -> Self {
        Self { page, min_len: 1 }
    }

    /// Rejects weak candidates, letting later strategies supply a strong one
    pub fn strict(page: &'p Page) -> Self {
        Self {
            page,
            min_len: MIN_IDENTIFIER_LEN,
        }
    }

    /// Run the strategy chain. Returns `None` only when every strategy fails.
    /// The result is not normalized.
    pub fn resolve(&self, target: HoverTarget) -> Option<String> {
        for (name, strategy) in STRATEGIES {
            if let Some(id) = strategy(self, target) {
                tracing::debug!("Resolved identifier {} via {}", id, name);
                return Some(id);
            }
        }
        tracing::debug!("No identifier found (min length {})", self.min_len);
        None
    }

    fn accept(&self, id: String) -> Option<String> {
        (id.chars().count() >= self.min_len).then_some(id)
    }

    /// Thread attribute first, then the legacy id, then the generic id
    fn preferred_id(&self, el: ElementRef<'_>) -> Option<String> {
        let attrs = el.value();
        attrs
            .attr(THREAD_ATTR)
            .filter(|v| !v.is_empty())
            .and_then(|v| self.accept(with_thread_prefix(v)))
            .or_else(|| {
                [LEGACY_ATTR, MESSAGE_ATTR]
                    .iter()
                    .filter_map(|attr| attrs.attr(attr))
                    .filter(|v| !v.is_empty())
                    .find_map(|v| self.accept(v.to_string()))
            })
    }
}

fn from_url_hash(r: &Resolver<'_>, _target: HoverTarget) -> Option<String> {
    let hash = r.page.hash();
    HASH_PATTERNS
        .iter()
        .filter_map(|re| re.captures(&hash))
        .find_map(|cap| r.accept(with_thread_prefix(&cap[1])))
}

fn from_url_query(r: &Resolver<'_>, _target: HoverTarget) -> Option<String> {
    let url = r.page.url();
    THREAD_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(key, value)| key == *param && !value.is_empty())
            .and_then(|(_, value)| r.accept(with_thread_prefix(&value)))
    })
}

/// Direct association through the ancestor chain, else the candidate
/// whose box center lies closest to the target's
fn from_nearest_attribute(r: &Resolver<'_>, target: HoverTarget) -> Option<String> {
    let el = r.page.element(target)?;

    let direct = std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .filter(|candidate| ANY_ID_SELECTOR.matches(candidate))
        .find_map(|candidate| r.preferred_id(candidate));
    if direct.is_some() {
        return direct;
    }

    let origin = r.page.rect(target);
    let mut best: Option<(f64, String)> = None;
    let mut seen = 0usize;

    for selector in CANDIDATE_SELECTORS.iter() {
        for candidate in r.page.select(selector) {
            seen += 1;
            let Some(id) = r.preferred_id(candidate) else {
                continue;
            };
            let distance = origin.center_distance(&r.page.rect(candidate.id()));
            if best.as_ref().is_none_or(|(d, _)| distance < *d) {
                best = Some((distance, id));
            }
        }
    }

    tracing::trace!("Proximity search over {} candidates", seen);
    best.map(|(_, id)| id)
}

fn from_url_pattern(r: &Resolver<'_>, _target: HoverTarget) -> Option<String> {
    URL_TOKEN_RE
        .captures(r.page.url().as_str())
        .and_then(|cap| r.accept(with_thread_prefix(&cap[1])))
}

fn from_row_ids(r: &Resolver<'_>, _target: HoverTarget) -> Option<String> {
    r.page
        .select(&ROW_SELECTOR)
        .filter(|row| {
            row.value()
                .id()
                .is_some_and(|id| ROW_ID_PREFIXES.iter().any(|p| id.starts_with(p)))
        })
        .find_map(|row| {
            [THREAD_ATTR, LEGACY_THREAD_ATTR]
                .iter()
                .filter_map(|attr| row.value().attr(attr))
                .find(|v| !v.is_empty())
                .and_then(|v| r.accept(with_thread_prefix(v)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r##"<html><body><table>
        <tr class="zA" data-rect="0 0 800 30"><td><span class="bog" id="s1" data-rect="40 5 200 20">First</span></td></tr>
        <tr class="zA" data-rect="0 30 800 30"><td><span class="bog" id="s2" data-rect="40 35 200 20">Second</span></td></tr>
        <tr class="zA" data-rect="0 60 800 30"><td><span class="bog" id="s3" data-rect="40 65 200 20">Third</span></td></tr>
        </table>
        <div data-legacy-message-id="18a1b2c3d4e5f6a7" data-rect="900 0 10 10"></div>
        <div data-message-id="#msg-f:1788000000000000002" data-rect="900 30 10 10"></div>
        <div data-thread-id="#thread-f:1788000000000000003" data-rect="900 60 10 10"></div>
    </body></html>"##;

    fn page(html: &str, url: &str) -> Page {
        Page::parse(html, url).unwrap()
    }

    #[test]
    fn test_url_hash_layouts() {
        let html = "<span id='t'>x</span>";
        let cases = [
            ("https://m.example.com/mail/u/0/#inbox/thread-f:1788", "thread-f:1788"),
            ("https://m.example.com/mail/u/0/#inbox/FMfcgzQZTzWx", "thread-f:FMfcgzQZTzWx"),
            ("https://m.example.com/mail/u/0/#label/work/FMfcgz", "thread-f:FMfcgz"),
            ("https://m.example.com/mail/u/0/#inbox/thread/ABC123", "thread-f:ABC123"),
            ("https://m.example.com/mail/u/0/#search/f:17880000", "thread-f:17880000"),
        ];
        for (url, expected) in cases {
            let p = page(html, url);
            let t = p.first("#t").unwrap();
            assert_eq!(Resolver::new(&p).resolve(t).as_deref(), Some(expected), "{url}");
        }
    }

    #[test]
    fn test_url_query_parameter() {
        let p = page("<span id='t'>x</span>", "https://m.example.com/mail/?ui=2&th=18a1b2c3d4e5");
        let t = p.first("#t").unwrap();
        assert_eq!(
            Resolver::new(&p).resolve(t).as_deref(),
            Some("thread-f:18a1b2c3d4e5")
        );
    }

    #[test]
    fn test_ancestor_attribute_wins_over_proximity() {
        let html = r#"<div data-message-id="msg-f:42" data-legacy-message-id="18a1b2c3d4e5f6a7">
                <span id="t" data-rect="0 0 10 10">x</span></div>
            <div data-thread-id="999" data-rect="0 0 10 10"></div>"#;
        let p = page(html, "https://m.example.com/mail/");
        let t = p.first("#t").unwrap();
        // legacy id preferred over the generic one on the same element
        assert_eq!(Resolver::new(&p).resolve(t).as_deref(), Some("18a1b2c3d4e5f6a7"));
    }

    #[test]
    fn test_ancestor_thread_attribute_is_prefixed() {
        let html = r#"<tr data-thread-id="1788000000000000001" data-message-id="m1">
            <td><span id="t">x</span></td></tr>"#;
        let p = page(&format!("<table>{html}</table>"), "https://m.example.com/mail/");
        let t = p.first("#t").unwrap();
        assert_eq!(
            Resolver::new(&p).resolve(t).as_deref(),
            Some("thread-f:1788000000000000001")
        );
    }

    #[test]
    fn test_nearest_candidate_by_center_distance() {
        let p = page(LIST, "https://m.example.com/mail/u/0/");
        let resolver = Resolver::new(&p);

        let first = p.first("#s1").unwrap();
        assert_eq!(resolver.resolve(first).as_deref(), Some("18a1b2c3d4e5f6a7"));

        let second = p.first("#s2").unwrap();
        assert_eq!(
            resolver.resolve(second).as_deref(),
            Some("#msg-f:1788000000000000002")
        );

        let third = p.first("#s3").unwrap();
        assert_eq!(
            resolver.resolve(third).as_deref(),
            Some("#thread-f:1788000000000000003")
        );
    }

    #[test]
    fn test_url_pattern_and_row_fallbacks() {
        let p = page(
            "<span id='t'>x</span>",
            "https://m.example.com/mail/?view=pt&msg=18a1b2c3d4",
        );
        let t = p.first("#t").unwrap();
        assert_eq!(
            Resolver::new(&p).resolve(t).as_deref(),
            Some("thread-f:18a1b2c3d4")
        );

        let html = r#"<table><tr id=":x1"><td>a</td></tr>
            <tr id=":m2" data-legacy-thread-id="18a1b2c3d4e5"><td><span id="t">b</span></td></tr></table>"#;
        let p = page(html, "https://m.example.com/mail/");
        let t = p.first("#t").unwrap();
        assert_eq!(
            Resolver::new(&p).resolve(t).as_deref(),
            Some("thread-f:18a1b2c3d4e5")
        );
    }

    #[test]
    fn test_every_strategy_failing_is_none() {
        let p = page("<p><span id='t'>nothing here</span></p>", "https://m.example.com/mail/");
        let t = p.first("#t").unwrap();
        assert_eq!(Resolver::new(&p).resolve(t), None);
        assert_eq!(Resolver::strict(&p).resolve(t), None);
    }

    #[test]
    fn test_strict_skips_weak_candidates() {
        let html = r#"<div data-message-id="r-42"><span id="t" data-rect="0 0 10 10">x</span></div>
            <div data-legacy-message-id="18a1b2c3d4e5f6a7" data-rect="500 500 10 10"></div>"#;
        let p = page(html, "https://m.example.com/mail/");
        let t = p.first("#t").unwrap();

        let weak = Resolver::new(&p).resolve(t).unwrap();
        assert_eq!(weak, "r-42");
        assert!(is_weak(&weak));

        let strong = Resolver::strict(&p).resolve(t).unwrap();
        assert_eq!(strong, "18a1b2c3d4e5f6a7");
        assert!(!is_weak(&strong));
    }

    #[test]
    fn test_with_thread_prefix() {
        assert_eq!(with_thread_prefix("123"), "thread-f:123");
        assert_eq!(with_thread_prefix("thread-f:123"), "thread-f:123");
        assert_eq!(with_thread_prefix("#thread-f:123"), "#thread-f:123");
    }
}
