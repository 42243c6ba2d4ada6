//! Line-oriented pointer scripts for `hovermail replay`
//!
//! ```text
//! enter tr.zA:nth-child(2) span.bog
//! wait 400
//! click overlay
//! leave tr.zA:nth-child(2) span.bog
//! ```

use anyhow::{Context, Result, bail};
use std::time::Duration;

use crate::actor::PointerEvent;
use crate::dom::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Event(PointerEvent),
    /// Click on the overlay itself
    ClickOverlay,
    Wait(Duration),
}

/// Parse one script line. Blank lines and `#` comments yield `None`.
pub fn parse_step(page: &Page, line: &str) -> Result<Option<Step>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, arg) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let arg = arg.trim();
    let step = match verb {
        "enter" => Step::Event(PointerEvent::Enter(page.first(arg)?)),
        "leave" => Step::Event(PointerEvent::Leave(page.first(arg)?)),
        "click" if arg == "overlay" => Step::ClickOverlay,
        "click" => Step::Event(PointerEvent::Click {
            target: page.first(arg)?,
            on_overlay: false,
        }),
        "rescan" => Step::Event(PointerEvent::Rescan),
        "wait" => {
            let ms: u64 = arg
                .parse()
                .with_context(|| format!("Invalid wait duration `{}`", arg))?;
            Step::Wait(Duration::from_millis(ms))
        }
        other => bail!("Unknown replay command `{}`", other),
    };
    Ok(Some(step))
}
