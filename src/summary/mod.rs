//! Per-hover summarization pipeline
//!
//! One hover produces one orchestration. Identifier resolution and page
//! extraction happen synchronously against the page; the remote stages run on
//! a spawned task that only carries owned data. Starting a new orchestration
//! cancels the previous one, and every overlay write re-checks cancellation
//! while holding the overlay lock, so a superseded flight can never overwrite
//! a newer one's output.

mod text;

use text::{fallback_summary, prepare_input};

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::constants::{
    EXTRACTION_FAILED_TEXT, LOADING_TEXT, OPEN_EMAIL_TEXT, SUMMARIZING_TEXT, UNIDENTIFIED_TEXT,
};
use crate::dom::{HoverTarget, Page};
use crate::extract::{EmailContext, context_from_payload, extract_from_ui};
use crate::ident::{CanonicalId, Resolver, is_weak, normalize};
use crate::overlay::{self, SharedOverlay};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Idle,
    ResolvingContext,
    AwaitingToken,
    AwaitingRemoteContent,
    AwaitingSummary,
    Done,
    Cancelled,
}

/// The live orchestration attempt
#[derive(Debug, Clone)]
pub struct PendingRequest {
    id: u64,
    token: CancellationToken,
}

impl PendingRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Holds at most one live request and the stage it has reached
#[derive(Debug, Default)]
pub struct RequestSlot {
    next_id: u64,
    current: Option<PendingRequest>,
    stage: Stage,
}

impl RequestSlot {
    /// Cancel whatever is live and hand out a new request
    pub fn begin(&mut self) -> PendingRequest {
        self.cancel();
        self.next_id += 1;
        let request = PendingRequest {
            id: self.next_id,
            token: CancellationToken::new(),
        };
        self.current = Some(request.clone());
        request
    }

    pub fn cancel(&mut self) {
        if let Some(previous) = self.current.take() {
            tracing::debug!("Request #{} cancelled", previous.id);
            previous.token.cancel();
        }
        self.stage = Stage::Idle;
    }

    fn holds(&self, request: &PendingRequest) -> bool {
        self.current.as_ref().is_some_and(|c| c.id == request.id)
    }

    pub fn advance(&mut self, request: &PendingRequest, stage: Stage) {
        if self.holds(request) {
            self.stage = stage;
        }
    }

    /// Free the slot if `request` still holds it
    pub fn release(&mut self, request: &PendingRequest) {
        if self.holds(request) {
            self.current = None;
            self.stage = Stage::Idle;
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn current_id(&self) -> Option<u64> {
        self.current.as_ref().map(|c| c.id)
    }
}

/// What the remote half of a flight has to do
enum Plan {
    Show(&'static str),
    Summarize(EmailContext),
    Fetch(CanonicalId),
}

enum Fetched {
    Content(EmailContext),
    Failed,
    Cancelled,
}

pub struct Summarizer {
    bridge: Arc<dyn Bridge>,
    overlay: SharedOverlay,
    slot: Arc<Mutex<RequestSlot>>,
}

impl Summarizer {
    pub fn new(bridge: Arc<dyn Bridge>, overlay: SharedOverlay) -> Self {
        Self {
            bridge,
            overlay,
            slot: Arc::new(Mutex::new(RequestSlot::default())),
        }
    }

    pub fn overlay(&self) -> &SharedOverlay {
        &self.overlay
    }

    pub fn current_request(&self) -> Option<u64> {
        lock_slot(&self.slot).current_id()
    }

    /// Stage of the live orchestration, `Idle` when there is none
    pub fn stage(&self) -> Stage {
        lock_slot(&self.slot).stage()
    }

    /// Cancel the live orchestration, if any
    pub fn cancel(&self) {
        lock_slot(&self.slot).cancel();
    }

    /// Start an orchestration for `target`, superseding any earlier one.
    ///
    /// The loading text is visible by the time this returns. The handle
    /// resolves to the stage the flight ended in.
    pub fn hover(&self, page: &Page, target: HoverTarget) -> JoinHandle<Stage> {
        let request = lock_slot(&self.slot).begin();
        tracing::debug!("Request #{} started for {:?}", request.id(), target);
        overlay::lock(&self.overlay).show(page.anchor_for(target), LOADING_TEXT);

        let flight = Flight {
            request,
            bridge: Arc::clone(&self.bridge),
            overlay: Arc::clone(&self.overlay),
            slot: Arc::clone(&self.slot),
        };
        flight.enter(Stage::ResolvingContext);
        let plan = plan(page, target);
        tokio::spawn(flight.run(plan))
    }
}

fn lock_slot(slot: &Mutex<RequestSlot>) -> std::sync::MutexGuard<'_, RequestSlot> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Resolve and extract against the page. Page content always wins over a
/// remote fetch.
fn plan(page: &Page, target: HoverTarget) -> Plan {
    let mut id = Resolver::new(page).resolve(target);
    let context = extract_from_ui(page, target);

    if id.is_none() && context.is_none() {
        return Plan::Show(UNIDENTIFIED_TEXT);
    }

    if id.as_deref().is_some_and(is_weak) {
        match Resolver::strict(page).resolve(target) {
            Some(strong) => {
                tracing::debug!("Replaced weak identifier with {}", strong);
                id = Some(strong);
            }
            None if context.is_none() => return Plan::Show(OPEN_EMAIL_TEXT),
            None => {}
        }
    }

    match (context, id) {
        (Some(context), _) => Plan::Summarize(context),
        (None, Some(id)) => Plan::Fetch(normalize(&id)),
        (None, None) => Plan::Show(UNIDENTIFIED_TEXT),
    }
}

/// The spawned half of one orchestration
struct Flight {
    request: PendingRequest,
    bridge: Arc<dyn Bridge>,
    overlay: SharedOverlay,
    slot: Arc<Mutex<RequestSlot>>,
}

impl Flight {
    /// Move to `stage` unless cancelled
    fn enter(&self, stage: Stage) -> bool {
        if self.request.is_cancelled() {
            return false;
        }
        lock_slot(&self.slot).advance(&self.request, stage);
        tracing::debug!("Request #{} -> {:?}", self.request.id, stage);
        true
    }

    /// Write to the overlay unless cancelled. The check and the write happen
    /// under the same lock.
    fn display(&self, text: &str) -> bool {
        let mut overlay = overlay::lock(&self.overlay);
        if self.request.is_cancelled() {
            return false;
        }
        overlay.update(text);
        true
    }

    fn finish(self, stage: Stage) -> Stage {
        lock_slot(&self.slot).release(&self.request);
        tracing::debug!("Request #{} finished: {:?}", self.request.id, stage);
        stage
    }

    fn conclude(self, text: &str) -> Stage {
        if self.display(text) {
            self.finish(Stage::Done)
        } else {
            self.finish(Stage::Cancelled)
        }
    }

    async fn run(self, plan: Plan) -> Stage {
        let context = match plan {
            Plan::Show(text) => return self.conclude(text),
            Plan::Summarize(context) => context,
            Plan::Fetch(id) => {
                let fetched = self.fetch(&id).await;
                match fetched {
                    Fetched::Content(context) => context,
                    Fetched::Failed => return self.conclude(EXTRACTION_FAILED_TEXT),
                    Fetched::Cancelled => return self.finish(Stage::Cancelled),
                }
            }
        };
        self.summarize(context).await
    }

    async fn fetch(&self, id: &CanonicalId) -> Fetched {
        if !self.enter(Stage::AwaitingToken) {
            return Fetched::Cancelled;
        }
        let token = match self.bridge.request_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Token request failed: {}", e);
                return Fetched::Failed;
            }
        };

        if !self.enter(Stage::AwaitingRemoteContent) {
            return Fetched::Cancelled;
        }
        let payload = match self.bridge.fetch_message(id, &token).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Message fetch for {} failed: {}", id, e);
                return Fetched::Failed;
            }
        };

        match context_from_payload(&payload) {
            Some(context) => Fetched::Content(context),
            None => {
                tracing::warn!("Fetched message has no usable content");
                Fetched::Failed
            }
        }
    }

    async fn summarize(self, context: EmailContext) -> Stage {
        if !self.enter(Stage::AwaitingSummary) || !self.display(SUMMARIZING_TEXT) {
            return self.finish(Stage::Cancelled);
        }

        let input = prepare_input(&context.render());
        tracing::debug!(
            "Request #{} summarizing {} chars of {:?} context",
            self.request.id,
            input.chars().count(),
            context.source
        );
        let summary = match self.bridge.summarize(&input).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                tracing::warn!("Summarizer failed, using local fallback: {}", e);
                fallback_summary(&input)
            }
        };
        self.conclude(&summary)
    }
}
