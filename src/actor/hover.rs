//! Pointer event loop for one page session
//!
//! Runs on the task that owns the page. Pointer events arrive over a channel;
//! entering a hover target arms a debounce timer and only a settled hover
//! starts an orchestration. Leave and click events drive the overlay.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use scraper::Selector;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::dom::{HoverTarget, Page};
use crate::overlay::{self, ClickHit};
use crate::summary::{Stage, Summarizer};

/// Message-list subjects and links the webmail UI renders
const TARGET_SELECTORS: [&str; 12] = [
    "tr.zA span.bog",
    "tr.zA .y6 span:not(.T6)",
    r#".zA[role="row"] h2 span"#,
    r#".zA[role="row"] .y6"#,
    ".ha h2.J-JN-I",
    r#"td[role="gridcell"] .bog"#,
    ".Zt",
    ".zA.yO .bog",
    "h2.bqe",
    ".xY.a4W h2",
    "tr:not(.btb) span.bog",
    r#"tr.zA [role="link"]"#,
];

static TARGETS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(&TARGET_SELECTORS.join(", ")).expect("valid hover target selectors")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Enter(HoverTarget),
    Leave(HoverTarget),
    Click { target: HoverTarget, on_overlay: bool },
    /// Re-run target attachment. A page is a fixed snapshot, so this only
    /// matters for targets the first scan could not see; already attached
    /// targets are never attached again.
    Rescan,
}

pub struct HoverLoop<'a> {
    page: &'a Page,
    summarizer: &'a Summarizer,
    debounce: Duration,
    /// Targets already marked; never attached twice
    attached: HashSet<HoverTarget>,
    pending: Option<(HoverTarget, Instant)>,
    latest: Option<JoinHandle<Stage>>,
}

impl<'a> HoverLoop<'a> {
    pub fn new(page: &'a Page, summarizer: &'a Summarizer, debounce: Duration) -> Self {
        Self {
            page,
            summarizer,
            debounce,
            attached: HashSet::new(),
            pending: None,
            latest: None,
        }
    }

    /// Mark every hover target not yet marked. Returns how many were new.
    pub fn attach(&mut self) -> usize {
        let before = self.attached.len();
        self.attached
            .extend(self.page.select(&TARGETS).map(|el| el.id()));
        let added = self.attached.len() - before;
        if added > 0 {
            tracing::debug!("Attached {} hover targets", added);
        }
        added
    }

    /// The attached target containing `node`, innermost first
    fn attached_target(&self, node: HoverTarget) -> Option<HoverTarget> {
        let el = self.page.element(node)?;
        std::iter::once(node)
            .chain(el.ancestors().map(|a| a.id()))
            .find(|id| self.attached.contains(id))
    }

    /// Process events until the channel closes. Returns the handle of the
    /// last orchestration started, if any.
    pub async fn run(mut self, mut events: mpsc::Receiver<PointerEvent>) -> Option<JoinHandle<Stage>> {
        self.attach();

        loop {
            let deadline = self.pending.map(|(_, deadline)| deadline);
            let event = match deadline {
                Some(deadline) => tokio::select! {
                    event = events.recv() => event,
                    _ = tokio::time::sleep_until(deadline) => {
                        self.fire();
                        continue;
                    }
                },
                None => events.recv().await,
            };

            let Some(event) = event else {
                break;
            };
            self.handle(event);
        }

        if let Some((target, _)) = self.pending.take() {
            tracing::debug!("Dropping unsettled hover on {:?}", target);
        }
        self.latest
    }

    fn handle(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Enter(node) => {
                if let Some(target) = self.attached_target(node) {
                    self.pending = Some((target, Instant::now() + self.debounce));
                }
            }
            PointerEvent::Leave(node) => {
                let target = self.attached_target(node).unwrap_or(node);
                if self.pending.is_some_and(|(pending, _)| pending == target) {
                    tracing::trace!("Hover left before settling");
                    self.pending = None;
                }
                overlay::lock(self.summarizer.overlay()).pointer_left(target);
            }
            PointerEvent::Click { target, on_overlay } => {
                let mut overlay = overlay::lock(self.summarizer.overlay());
                let hit = if on_overlay {
                    ClickHit::Overlay
                } else if overlay
                    .origin()
                    .is_some_and(|origin| self.page.contains(origin, target))
                {
                    ClickHit::Origin
                } else {
                    ClickHit::Outside
                };
                overlay.clicked(hit);
            }
            PointerEvent::Rescan => {
                self.attach();
            }
        }
    }

    fn fire(&mut self) {
        if let Some((target, _)) = self.pending.take() {
            tracing::debug!("Hover settled on {:?}", target);
            self.latest = Some(self.summarizer.hover(self.page, target));
        }
    }
}
