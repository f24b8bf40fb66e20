#![warn(clippy::unwrap_used)]

//! Serving engine: picks the ad (or carousel ads) a visitor sees and
//! records the clicks that come back.

pub mod clicks;
pub mod selector;

pub use clicks::{session_fingerprint, ClickOutcome, ClickRecorder};
pub use selector::{AdSelector, CarouselSelection, Selection};
