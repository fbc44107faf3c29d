//! Playback sink seam.

use async_trait::async_trait;
use atlas_foundation::{VoiceError, VoiceResult};
use std::time::Duration;
use tokio::sync::Notify;

/// Accepts synthesized audio and plays it to completion.
///
/// Decoding and device output live behind this trait; the pipeline only
/// needs the completion signal and an immediate halt.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play the buffer to completion. Returns `Err(Stopped)` when `halt`
    /// cuts the playback short, so callers can tell the two apart.
    async fn play(&self, audio: &[u8], sample_rate: u32, duration: Duration) -> VoiceResult<()>;

    /// Cut off the current playback immediately. No-op when idle.
    fn halt(&self);
}

/// Sink that consumes audio in real time without producing sound.
///
/// Sleeps for the utterance duration so queue serialization behaves exactly
/// as with a real output device. Used by tests and headless runs.
#[derive(Default)]
pub struct NoopSink {
    interrupt: Notify,
}

impl NoopSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioSink for NoopSink {
    async fn play(&self, _audio: &[u8], _sample_rate: u32, duration: Duration) -> VoiceResult<()> {
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = self.interrupt.notified() => {
                tracing::debug!(target: "audio", "playback halted");
                Err(VoiceError::Stopped)
            }
        }
    }

    fn halt(&self) {
        // notify_waiters wakes only in-flight plays; an idle sink stays idle.
        self.interrupt.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn play_completes_after_duration() {
        let sink = NoopSink::new();
        let started = tokio::time::Instant::now();
        sink.play(&[0u8; 4], 24_000, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn halt_cuts_playback_short_and_reports_it() {
        let sink = Arc::new(NoopSink::new());
        let player = sink.clone();
        let handle =
            tokio::spawn(
                async move { player.play(&[0u8; 4], 24_000, Duration::from_secs(60)).await },
            );
        tokio::time::sleep(Duration::from_millis(10)).await;
        sink.halt();
        assert_eq!(handle.await.unwrap().unwrap_err(), VoiceError::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn halt_while_idle_does_not_skip_next_play() {
        let sink = NoopSink::new();
        sink.halt();
        let started = tokio::time::Instant::now();
        sink.play(&[], 24_000, Duration::from_secs(1)).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }
}
