//! Shared speech pipeline types.

use atlas_foundation::VoiceError;
use atlas_viseme::VisemeEvent;
use std::sync::Arc;
use std::time::Duration;

/// Fully prepared utterance: audio plus the viseme timeline that animates it.
///
/// Immutable once built; the cache and the playback pipeline share it behind
/// an `Arc`.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: Vec<u8>,
    pub visemes: Arc<[VisemeEvent]>,
    pub duration: Duration,
    pub sample_rate: u32,
    pub format: String,
}

/// Lifecycle signals emitted by [`crate::SpeechOrchestrator`].
#[derive(Debug)]
pub enum SpeechEvent {
    /// Playback of an utterance is about to begin.
    SpeakingStarted { text: String },
    /// The utterance finished playing.
    SpeakingEnded,
    /// `stop()` interrupted active speech.
    Stopped,
    /// A segment failed to synthesize or play; the queue keeps going.
    Error { error: VoiceError },
}
