//! Speech orchestration: chunk buffering, segmentation, synthesis, playback.

use crate::backend::SynthesisBackend;
use crate::cache::SynthesisCache;
use crate::segment::SegmentSplitter;
use crate::types::{SpeechEvent, SynthesisResult};
use atlas_audio::AudioSink;
use atlas_channel::SynthesisPayload;
use atlas_foundation::{EventRegistry, PipelineConfig, SharedClock, VoiceError, VoiceResult};
use atlas_viseme::VisemeGenerator;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

/// Drives the speak path end to end.
///
/// Text arrives either as complete utterances (`speak`) or as token-sized
/// bursts (`speak_chunk`) that are debounced, segmented, and queued. A single
/// drain task synthesizes and plays queued segments strictly in submission
/// order. Cloning yields another handle to the same pipeline.
#[derive(Clone)]
pub struct SpeechOrchestrator {
    inner: Arc<Inner>,
    _drain: Arc<DrainGuard>,
}

struct DrainGuard(JoinHandle<()>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct QueueItem {
    text: String,
    done: Option<oneshot::Sender<VoiceResult<()>>>,
}

struct Inner {
    backend: Arc<dyn SynthesisBackend>,
    sink: Arc<dyn AudioSink>,
    cache: Arc<SynthesisCache>,
    visemes: VisemeGenerator,
    splitter: SegmentSplitter,
    voice: String,
    debounce: Duration,
    events: EventRegistry<SpeechEvent>,
    buffer: Mutex<String>,
    queue: Mutex<VecDeque<QueueItem>>,
    wake: Notify,
    in_flight: Mutex<HashSet<String>>,
    speaking: AtomicBool,
    // Bumped by stop(); a debounce task that outlives its epoch is stale.
    epoch: AtomicU64,
    debounce_task: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechOrchestrator {
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        sink: Arc<dyn AudioSink>,
        config: &PipelineConfig,
        clock: SharedClock,
    ) -> Self {
        let cache = Arc::new(SynthesisCache::new(&config.cache, clock));
        Self::with_cache(backend, sink, cache, config)
    }

    /// Build an orchestrator over an existing cache so several orchestrators
    /// in the same voice namespace share synthesis results.
    pub fn with_cache(
        backend: Arc<dyn SynthesisBackend>,
        sink: Arc<dyn AudioSink>,
        cache: Arc<SynthesisCache>,
        config: &PipelineConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            backend,
            sink,
            cache,
            visemes: VisemeGenerator::new(config.viseme.clone()),
            splitter: SegmentSplitter::new(&config.segment),
            voice: config.voice.clone(),
            debounce: Duration::from_millis(config.speech.chunk_debounce_ms),
            events: EventRegistry::new(),
            buffer: Mutex::new(String::new()),
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            in_flight: Mutex::new(HashSet::new()),
            speaking: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            debounce_task: Mutex::new(None),
        });
        let drain = tokio::spawn(drain_loop(Arc::clone(&inner)));
        Self {
            inner,
            _drain: Arc::new(DrainGuard(drain)),
        }
    }

    /// Signals: speaking started/ended, stopped, per-segment errors.
    pub fn events(&self) -> &EventRegistry<SpeechEvent> {
        &self.inner.events
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::Acquire)
    }

    /// Produce (or fetch from cache) the synthesis result without playing it.
    pub async fn synthesize(&self, text: &str) -> VoiceResult<Arc<SynthesisResult>> {
        self.inner.prepare(text).await
    }

    /// Speak one utterance to completion: queued behind any segments already
    /// playing, resolved once its audio finishes (or with `Stopped` if the
    /// queue is cleared first).
    pub async fn speak(&self, text: &str) -> VoiceResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::InvalidInput("cannot speak empty text".into()));
        }
        let (tx, rx) = oneshot::channel();
        self.inner.enqueue(QueueItem {
            text: text.to_owned(),
            done: Some(tx),
        });
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(VoiceError::Stopped),
        }
    }

    /// Append a text burst to the rolling buffer and re-arm the debounce
    /// timer. When the timer fires, complete segments are queued for playback
    /// and any partial tail stays buffered for the next burst.
    pub fn speak_chunk(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.inner.buffer.lock().push_str(chunk);

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if inner.epoch.load(Ordering::Acquire) == epoch {
                inner.flush_buffer();
            }
        });
        if let Some(previous) = self.inner.debounce_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Queue everything buffered right now, without waiting for the debounce
    /// timer, including a trailing span that has no boundary yet.
    pub fn flush(&self) {
        if let Some(task) = self.inner.debounce_task.lock().take() {
            task.abort();
        }
        self.inner.flush_buffer();
        let tail = std::mem::take(&mut *self.inner.buffer.lock());
        let tail = tail.trim();
        if !tail.is_empty() {
            self.inner.enqueue(QueueItem {
                text: tail.to_owned(),
                done: None,
            });
        }
    }

    /// Cancel in-flight synthesis, halt playback, and clear all queued and
    /// buffered text. Safe to call at any time; a second call is a no-op.
    pub fn stop(&self) {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = inner.debounce_task.lock().take() {
            task.abort();
        }
        inner.buffer.lock().clear();

        // Dropping queued items closes their completion channels; waiting
        // speak() callers observe Stopped.
        let cleared = inner.queue.lock().drain(..).count();
        let cancelled: Vec<String> = inner.in_flight.lock().drain().collect();
        for id in &cancelled {
            inner.backend.cancel(id);
        }
        inner.sink.halt();

        if inner.speaking.swap(false, Ordering::AcqRel) {
            inner.events.emit(&SpeechEvent::Stopped);
        }
        tracing::debug!(
            target: "speech",
            cleared,
            cancelled = cancelled.len(),
            "speech stopped"
        );
    }
}

impl Inner {
    fn enqueue(&self, item: QueueItem) {
        self.queue.lock().push_back(item);
        self.speaking.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Hand the buffer to the splitter; queue complete segments, re-buffer
    /// the remainder.
    fn flush_buffer(&self) {
        let segments = {
            let mut buffer = self.buffer.lock();
            let (segments, remainder) = self.splitter.flush(&buffer);
            *buffer = remainder;
            segments
        };
        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            self.enqueue(QueueItem {
                text: segment.to_owned(),
                done: None,
            });
        }
    }

    /// Cache-aware synthesis: on a miss, open the channel, send the request,
    /// attach the viseme timeline, and store the result.
    async fn prepare(&self, text: &str) -> VoiceResult<Arc<SynthesisResult>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::InvalidInput(
                "cannot synthesize empty text".into(),
            ));
        }
        if let Some(hit) = self.cache.get(text, &self.voice) {
            tracing::debug!(target: "speech", text, "synthesis served from cache");
            return Ok(hit);
        }

        self.backend.open().await?;
        let id = uuid::Uuid::new_v4().to_string();
        self.in_flight.lock().insert(id.clone());
        let outcome = self.backend.synthesize(&id, text, &self.voice).await;
        self.in_flight.lock().remove(&id);
        let payload = outcome?;

        let duration = playback_duration(&payload);
        let visemes = self.visemes.generate(text, Some(duration));
        let result = Arc::new(SynthesisResult {
            audio: payload.audio,
            visemes,
            duration,
            sample_rate: payload.sample_rate,
            format: payload.format,
        });
        self.cache.insert(text, &self.voice, Arc::clone(&result));
        Ok(result)
    }

    async fn speak_one(&self, item: QueueItem) {
        let QueueItem { text, done } = item;
        self.events.emit(&SpeechEvent::SpeakingStarted { text: text.clone() });

        let outcome = match self.prepare(&text).await {
            Ok(result) => {
                self.sink
                    .play(&result.audio, result.sample_rate, result.duration)
                    .await
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => self.events.emit(&SpeechEvent::SpeakingEnded),
            Err(e) if e.is_cancellation() => {
                tracing::debug!(target: "speech", text, "segment cancelled");
            }
            Err(e) => {
                // One bad segment must not silence the rest of the queue.
                tracing::warn!(target: "speech", text, error = %e, "segment failed, advancing");
                self.events.emit(&SpeechEvent::Error { error: e.clone() });
            }
        }

        if let Some(tx) = done {
            let _ = tx.send(outcome);
        }
    }
}

/// FIFO queue drain; one per orchestrator.
async fn drain_loop(inner: Arc<Inner>) {
    loop {
        let notified = inner.wake.notified();
        loop {
            let item = inner.queue.lock().pop_front();
            match item {
                Some(item) => inner.speak_one(item).await,
                None => break,
            }
        }
        // Only report idle if stop() has not already reset the flag.
        if inner.queue.lock().is_empty() {
            inner.speaking.store(false, Ordering::Release);
        }
        notified.await;
    }
}

/// Playback length of a synthesis payload.
///
/// WAV payloads carry a 44-byte header ahead of the sample data; anything
/// else is treated as raw 16-bit mono PCM at the announced rate.
fn playback_duration(payload: &SynthesisPayload) -> Duration {
    let data_len = if payload.format.eq_ignore_ascii_case("wav") {
        payload.audio.len().saturating_sub(44)
    } else {
        payload.audio.len()
    };
    let samples = data_len / 2;
    Duration::from_secs_f64(samples as f64 / f64::from(payload.sample_rate.max(1)))
}
