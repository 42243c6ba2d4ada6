pub mod hover;
pub mod retry;

pub use hover::{HoverLoop, PointerEvent};
