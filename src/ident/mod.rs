//! Email identifier discovery and canonicalization

mod normalize;
mod resolve;

pub use normalize::{CanonicalId, normalize};
pub use resolve::{Resolver, is_weak};
