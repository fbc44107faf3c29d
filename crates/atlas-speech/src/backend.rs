//! Synthesis backend seam.

use async_trait::async_trait;
use atlas_channel::{SpeechChannel, SynthesisPayload};
use atlas_foundation::VoiceResult;

/// Produces audio for text.
///
/// The production implementation is [`SpeechChannel`]; tests substitute a
/// scripted mock.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Ensure the backend is ready to take requests. Idempotent.
    async fn open(&self) -> VoiceResult<()>;

    /// Synthesize `text` with `voice`, correlated by `id`.
    async fn synthesize(&self, id: &str, text: &str, voice: &str) -> VoiceResult<SynthesisPayload>;

    /// Reject the outstanding request `id` with `Stopped`, if still pending.
    fn cancel(&self, id: &str);
}

#[async_trait]
impl SynthesisBackend for SpeechChannel {
    async fn open(&self) -> VoiceResult<()> {
        self.connect().await
    }

    async fn synthesize(&self, id: &str, text: &str, voice: &str) -> VoiceResult<SynthesisPayload> {
        SpeechChannel::synthesize(self, id, text, voice).await
    }

    fn cancel(&self, id: &str) {
        self.cancel_request(id);
    }
}
