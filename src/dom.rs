//! Host page model: a parsed DOM snapshot with its URL and layout
//!
//! The webmail page is owned by a third party. We only ever read it; the one
//! piece of state we keep about its elements lives in the hover loop.

use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use crate::constants::OVERLAY_GAP_PX;

/// Attribute carrying an element's captured layout: `"x y width height"`.
const RECT_ATTR: &str = "data-rect";

/// Attribute on the root element carrying the captured scroll offset: `"x y"`.
const SCROLL_ATTR: &str = "data-scroll";

#[derive(Debug, Error)]
pub enum DomError {
    #[error("invalid page url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid selector `{0}`")]
    Selector(String),
    #[error("no element matches `{0}`")]
    NoMatch(String),
}

/// An element of the host page. Only valid for the page it came from.
pub type HoverTarget = NodeId;

/// Rendered bounding box of an element, in viewport pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Euclidean distance between the centers of two boxes
    pub fn center_distance(&self, other: &Rect) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    fn parse(value: &str) -> Option<Self> {
        match parse_numbers(value)?.as_slice() {
            [x, y, w, h] => Some(Self::new(*x, *y, *w, *h)),
            _ => None,
        }
    }
}

fn parse_numbers(value: &str) -> Option<Vec<f64>> {
    value.split_whitespace().map(|n| n.parse().ok()).collect()
}

fn parse_scroll(value: &str) -> Option<(f64, f64)> {
    match parse_numbers(value)?.as_slice() {
        [x, y] => Some((*x, *y)),
        _ => None,
    }
}

/// Document position of the overlay, derived from a target's box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub target: HoverTarget,
    pub top: f64,
    pub left: f64,
}

/// One page session: DOM snapshot, URL, scroll offset, and layout
pub struct Page {
    html: Html,
    url: Url,
    scroll: (f64, f64),
    rects: HashMap<NodeId, Rect>,
}

impl Page {
    pub fn parse(html: &str, url: &str) -> Result<Self, DomError> {
        let html = Html::parse_document(html);
        let url = Url::parse(url)?;

        let mut rects = HashMap::new();
        if let Ok(sel) = Selector::parse(&format!("[{RECT_ATTR}]")) {
            for el in html.select(&sel) {
                if let Some(rect) = el.value().attr(RECT_ATTR).and_then(Rect::parse) {
                    rects.insert(el.id(), rect);
                }
            }
        }

        let scroll = html
            .root_element()
            .value()
            .attr(SCROLL_ATTR)
            .and_then(parse_scroll)
            .unwrap_or_default();

        Ok(Self {
            html,
            url,
            scroll,
            rects,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL fragment including its leading `#`, or empty
    pub fn hash(&self) -> String {
        self.url
            .fragment()
            .map(|f| format!("#{f}"))
            .unwrap_or_default()
    }

    pub fn rect(&self, id: NodeId) -> Rect {
        self.rects.get(&id).copied().unwrap_or_default()
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> {
        self.html.select(selector)
    }

    /// First element matching a CSS selector given as text
    pub fn first(&self, css: &str) -> Result<HoverTarget, DomError> {
        let selector = parse_selector(css)?;
        self.html
            .select(&selector)
            .next()
            .map(|el| el.id())
            .ok_or_else(|| DomError::NoMatch(css.to_string()))
    }

    /// Whether `node` is `ancestor` or lies beneath it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if ancestor == node {
            return true;
        }
        self.html
            .tree
            .get(node)
            .map(|n| n.ancestors().any(|a| a.id() == ancestor))
            .unwrap_or(false)
    }

    pub fn anchor_for(&self, target: HoverTarget) -> Anchor {
        let rect = self.rect(target);
        Anchor {
            target,
            top: rect.bottom() + self.scroll.1 + OVERLAY_GAP_PX,
            left: rect.x + self.scroll.0,
        }
    }
}

pub fn parse_selector(css: &str) -> Result<Selector, DomError> {
    Selector::parse(css).map_err(|_| DomError::Selector(css.to_string()))
}

/// The element itself or its nearest ancestor matching `selector`
pub fn closest<'a>(el: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .find(|candidate| selector.matches(candidate))
}

/// Whitespace-trimmed text content of an element
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
