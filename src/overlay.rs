//! The single summary overlay shown next to a hovered email
//!
//! Created lazily on first show and reused for the rest of the session. At
//! most one leave listener and one outside-click listener are registered at a
//! time; showing again replaces them rather than adding more.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::dom::{Anchor, HoverTarget};

#[derive(Debug, Clone, PartialEq)]
pub struct TooltipState {
    pub visible: bool,
    pub anchor: Anchor,
    pub text: String,
}

/// Where a click landed relative to the overlay and its originating target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickHit {
    Overlay,
    Origin,
    Outside,
}

/// Draws the overlay. Called once per state change.
pub trait Renderer: Send {
    fn render(&mut self, state: &TooltipState);
}

/// Renders through the log
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&mut self, state: &TooltipState) {
        if state.visible {
            tracing::info!(
                "Overlay at ({:.0}, {:.0}): {}",
                state.anchor.left,
                state.anchor.top,
                state.text
            );
        } else {
            tracing::debug!("Overlay hidden");
        }
    }
}

pub struct Overlay {
    state: Option<TooltipState>,
    /// Target whose pointer-leave hides the overlay
    leave_listener: Option<HoverTarget>,
    click_listener: bool,
    renderer: Box<dyn Renderer>,
}

/// Shared between the hover loop and in-flight orchestrations
pub type SharedOverlay = Arc<Mutex<Overlay>>;

pub fn lock(overlay: &SharedOverlay) -> MutexGuard<'_, Overlay> {
    overlay.lock().unwrap_or_else(|e| e.into_inner())
}

impl Overlay {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self {
            state: None,
            leave_listener: None,
            click_listener: false,
            renderer,
        }
    }

    pub fn shared(renderer: Box<dyn Renderer>) -> SharedOverlay {
        Arc::new(Mutex::new(Self::new(renderer)))
    }

    pub fn state(&self) -> Option<&TooltipState> {
        self.state.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.visible)
    }

    /// The target the overlay is currently anchored to, while visible
    pub fn origin(&self) -> Option<HoverTarget> {
        self.leave_listener
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        usize::from(self.leave_listener.is_some()) + usize::from(self.click_listener)
    }

    /// Position against `anchor`, show `text`, and (re)bind both listeners
    pub fn show(&mut self, anchor: Anchor, text: &str) {
        let state = self.state.get_or_insert_with(|| {
            tracing::debug!("Creating overlay");
            TooltipState {
                visible: false,
                anchor,
                text: String::new(),
            }
        });
        state.anchor = anchor;
        state.text = text.to_string();
        state.visible = true;

        self.leave_listener = Some(anchor.target);
        self.click_listener = true;
        self.render();
    }

    /// Replace the text in place. A hidden overlay stays hidden.
    pub fn update(&mut self, text: &str) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.text = text.to_string();
        self.render();
    }

    pub fn hide(&mut self) {
        self.leave_listener = None;
        self.click_listener = false;
        if let Some(state) = self.state.as_mut().filter(|s| s.visible) {
            state.visible = false;
            self.render();
        }
    }

    /// Pointer left `target`. Returns whether the overlay was hidden.
    pub fn pointer_left(&mut self, target: HoverTarget) -> bool {
        if self.leave_listener != Some(target) {
            return false;
        }
        self.hide();
        true
    }

    /// Returns whether the click hid the overlay
    pub fn clicked(&mut self, hit: ClickHit) -> bool {
        if !self.click_listener || hit != ClickHit::Outside {
            return false;
        }
        self.hide();
        true
    }

    fn render(&mut self) {
        if let Some(state) = &self.state {
            self.renderer.render(state);
        }
    }
}

/// Keeps every rendered state, for assertions
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub frames: Arc<Mutex<Vec<TooltipState>>>,
}

#[cfg(test)]
impl RecordingRenderer {
    pub fn frames(&self) -> Vec<TooltipState> {
        self.frames.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.frames().into_iter().map(|f| f.text).collect()
    }
}

#[cfg(test)]
impl Renderer for RecordingRenderer {
    fn render(&mut self, state: &TooltipState) {
        self.frames.lock().unwrap().push(state.clone());
    }
}
