//! Recognition transport seam.

use async_trait::async_trait;
use atlas_channel::{RecognitionUpdate, SpeechChannel};
use atlas_foundation::VoiceResult;
use tokio::sync::mpsc;

/// Carries one recognition session's traffic.
///
/// The production implementation is [`SpeechChannel`]; tests substitute a
/// scripted mock.
#[async_trait]
pub trait RecognitionTransport: Send + Sync {
    /// Ensure the transport is connected. Idempotent.
    async fn open(&self) -> VoiceResult<()>;

    /// Announce a session and return its inbound update stream.
    async fn start(
        &self,
        id: &str,
        language: &str,
    ) -> VoiceResult<mpsc::UnboundedReceiver<RecognitionUpdate>>;

    /// Stream one captured audio frame into the session.
    async fn send_chunk(&self, id: &str, format: &str, frame: Vec<u8>) -> VoiceResult<()>;

    /// Close the session on the server side.
    async fn stop(&self, id: &str) -> VoiceResult<()>;
}

#[async_trait]
impl RecognitionTransport for SpeechChannel {
    async fn open(&self) -> VoiceResult<()> {
        self.connect().await
    }

    async fn start(
        &self,
        id: &str,
        language: &str,
    ) -> VoiceResult<mpsc::UnboundedReceiver<RecognitionUpdate>> {
        self.start_recognition(id, language).await
    }

    async fn send_chunk(&self, id: &str, format: &str, frame: Vec<u8>) -> VoiceResult<()> {
        self.send_audio(id, format, frame).await
    }

    async fn stop(&self, id: &str) -> VoiceResult<()> {
        self.stop_recognition(id).await
    }
}
