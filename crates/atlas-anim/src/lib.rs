//! Animation and viseme playback scheduling.
//!
//! A single ordered queue of timed triggers is played against the runtime
//! clock. The rendering layer subscribes to trigger events; this crate only
//! decides what fires and when, never how it is drawn.

mod entry;
mod scheduler;

pub use entry::{AnimationEntry, AnimationTrigger};
pub use scheduler::AnimationScheduler;
