use crate::chunk::AudioChunk;
use async_trait::async_trait;
use atlas_foundation::{CaptureConfig, VoiceResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Source of timed raw-audio chunks.
///
/// `acquire` claims the underlying hardware; releasing happens when the
/// returned [`CaptureStream`] is dropped, so ownership of the stream is
/// ownership of the device.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Claim the device and start producing chunks of `config.chunk_ms`.
    ///
    /// Fails with `DeviceAccessDenied` when no device is available.
    async fn acquire(&self, config: &CaptureConfig) -> VoiceResult<CaptureStream>;
}

/// Live capture handle. Dropping it signals the producer to stop and
/// releases the device.
#[derive(Debug)]
pub struct CaptureStream {
    rx: mpsc::Receiver<AudioChunk>,
    stop: Arc<AtomicBool>,
}

impl CaptureStream {
    pub fn new(rx: mpsc::Receiver<AudioChunk>, stop: Arc<AtomicBool>) -> Self {
        Self { rx, stop }
    }

    /// Await the next captured chunk; `None` once the producer has stopped.
    pub async fn next_chunk(&mut self) -> Option<AudioChunk> {
        self.rx.recv().await
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
