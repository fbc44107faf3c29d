//! Scripted capture device for tests and offline runs.

use crate::chunk::AudioChunk;
use crate::device::{CaptureDevice, CaptureStream};
use async_trait::async_trait;
use atlas_foundation::{CaptureConfig, VoiceError, VoiceResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capture device yielding a pre-scripted chunk sequence.
///
/// After the script runs out the stream stays open until dropped, matching a
/// real microphone that keeps capturing until released.
pub struct ScriptedCaptureDevice {
    chunks: Mutex<VecDeque<AudioChunk>>,
    deny: bool,
    acquisitions: AtomicUsize,
    released: Mutex<Option<Arc<AtomicBool>>>,
}

impl ScriptedCaptureDevice {
    pub fn new(chunks: Vec<AudioChunk>) -> Self {
        Self {
            chunks: Mutex::new(chunks.into()),
            deny: false,
            acquisitions: AtomicUsize::new(0),
            released: Mutex::new(None),
        }
    }

    /// Device that refuses every acquisition.
    pub fn denied() -> Self {
        Self {
            chunks: Mutex::new(VecDeque::new()),
            deny: true,
            acquisitions: AtomicUsize::new(0),
            released: Mutex::new(None),
        }
    }

    pub fn acquisition_count(&self) -> usize {
        self.acquisitions.load(Ordering::Acquire)
    }

    /// Whether the most recently acquired stream has been released.
    pub fn is_released(&self) -> bool {
        self.released
            .lock()
            .as_ref()
            .map(|flag| flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

#[async_trait]
impl CaptureDevice for ScriptedCaptureDevice {
    async fn acquire(&self, _config: &CaptureConfig) -> VoiceResult<CaptureStream> {
        if self.deny {
            return Err(VoiceError::DeviceAccessDenied(
                "scripted device denied".into(),
            ));
        }
        self.acquisitions.fetch_add(1, Ordering::AcqRel);

        let script: Vec<AudioChunk> = self.chunks.lock().drain(..).collect();
        let stop = Arc::new(AtomicBool::new(false));
        *self.released.lock() = Some(stop.clone());

        let (tx, rx) = mpsc::channel(script.len().max(1));
        let producer_stop = stop.clone();
        tokio::spawn(async move {
            for chunk in script {
                if producer_stop.load(Ordering::Acquire) || tx.send(chunk).await.is_err() {
                    return;
                }
            }
            // Script exhausted: hold the channel open until released.
            tx.closed().await;
        });

        Ok(CaptureStream::new(rx, stop))
    }
}
