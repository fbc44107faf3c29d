//! Maps text to timed mouth-shape (viseme) sequences for lip-sync.
//!
//! Generation is pure and deterministic: the same input always yields the
//! same timeline, which keeps animation test fixtures reproducible.

mod generator;
mod types;

pub use generator::VisemeGenerator;
pub use types::{Viseme, VisemeClass, VisemeEvent};
