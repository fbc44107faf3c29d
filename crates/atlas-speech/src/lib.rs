//! Text-to-speech side of the pipeline.
//!
//! Token-sized text bursts are debounced into a rolling buffer, segmented at
//! sentence/clause boundaries, synthesized over the duplex channel (or
//! served from cache), and played back strictly in order while viseme
//! timelines drive the avatar's mouth.

mod backend;
mod cache;
mod orchestrator;
mod segment;
mod types;

pub use backend::SynthesisBackend;
pub use cache::SynthesisCache;
pub use orchestrator::SpeechOrchestrator;
pub use segment::SegmentSplitter;
pub use types::{SpeechEvent, SynthesisResult};
