//! Recognition session lifecycle.

use crate::transport::RecognitionTransport;
use atlas_audio::{CaptureDevice, CaptureStream, PCM16_FORMAT};
use atlas_channel::RecognitionUpdate;
use atlas_foundation::{CaptureConfig, EventRegistry, VoiceError, VoiceResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// `Idle → Starting → Listening → Stopping → Idle`; a failed attempt parks
/// in `Errored` until the next `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Listening,
    Stopping,
    Errored,
}

/// Transcription signals surfaced to consumers.
///
/// Several `Interim` events may precede one `Final`; only `Final` counts as
/// a completed utterance downstream.
#[derive(Debug)]
pub enum TranscriptEvent {
    Interim { text: String, confidence: f32 },
    Final { text: String, confidence: f32 },
    /// The session closed, whether by caller stop or server end-of-speech.
    Ended,
    Error { error: VoiceError },
}

/// One capture-and-stream session at a time.
///
/// `start` claims the capture device, announces the session, and pumps
/// chunks until stopped. The server may end the session on its own by
/// signalling end-of-speech; that path and caller-initiated `stop` converge
/// on the same cleanup so the device is never released twice. Cloning yields
/// another handle to the same session owner.
#[derive(Clone)]
pub struct RecognitionSession {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn RecognitionTransport>,
    device: Arc<dyn CaptureDevice>,
    config: CaptureConfig,
    language: String,
    events: EventRegistry<TranscriptEvent>,
    state: Mutex<SessionState>,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
    id: String,
    stop: Arc<Notify>,
    pump: Option<JoinHandle<()>>,
}

impl RecognitionSession {
    pub fn new(
        transport: Arc<dyn RecognitionTransport>,
        device: Arc<dyn CaptureDevice>,
        config: CaptureConfig,
        language: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                device,
                config,
                language: language.into(),
                events: EventRegistry::new(),
                state: Mutex::new(SessionState::Idle),
                active: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Interim/final transcripts, session end, and errors.
    pub fn events(&self) -> &EventRegistry<TranscriptEvent> {
        &self.inner.events
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Begin listening. A no-op while a session is already starting or
    /// running.
    pub async fn start(&self) -> VoiceResult<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                SessionState::Starting | SessionState::Listening | SessionState::Stopping => {
                    tracing::debug!(target: "stt", state = ?*state, "start ignored");
                    return Ok(());
                }
                SessionState::Idle | SessionState::Errored => *state = SessionState::Starting,
            }
        }
        match self.try_start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.inner.state.lock() = SessionState::Errored;
                tracing::warn!(target: "stt", error = %e, "recognition session failed to start");
                Err(e)
            }
        }
    }

    async fn try_start(&self) -> VoiceResult<()> {
        let inner = &self.inner;
        inner.transport.open().await?;
        let stream = inner.device.acquire(&inner.config).await?;
        let id = uuid::Uuid::new_v4().to_string();
        let updates = inner.transport.start(&id, &inner.language).await?;

        let stop = Arc::new(Notify::new());
        // Register before spawning so an immediate server-side end still
        // finds the session to clean up.
        *inner.active.lock().await = Some(ActiveSession {
            id: id.clone(),
            stop: Arc::clone(&stop),
            pump: None,
        });
        let handle = tokio::spawn(pump(
            Arc::clone(inner),
            id.clone(),
            stream,
            updates,
            stop,
        ));
        if let Some(active) = inner.active.lock().await.as_mut() {
            if active.id == id {
                active.pump = Some(handle);
            }
        }

        *inner.state.lock() = SessionState::Listening;
        tracing::info!(target: "stt", id, language = %inner.language, "recognition session started");
        Ok(())
    }

    /// End the active session, if any. Idempotent; a stop with no session is
    /// a quiet no-op.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let taken = inner.active.lock().await.take();
        let Some(active) = taken else {
            tracing::debug!(target: "stt", "stop with no active session");
            return;
        };

        *inner.state.lock() = SessionState::Stopping;
        active.stop.notify_one();
        if let Some(pump) = active.pump {
            // The pump drops the capture stream on exit, releasing the
            // device before the stop envelope goes out.
            let _ = pump.await;
        }
        if let Err(e) = inner.transport.stop(&active.id).await {
            tracing::debug!(target: "stt", id = active.id, error = %e, "stop envelope not sent");
        }
        *inner.state.lock() = SessionState::Idle;
        inner.events.emit(&TranscriptEvent::Ended);
        tracing::info!(target: "stt", id = active.id, "recognition session stopped");
    }
}

/// Streams capture chunks out and server updates in until either side ends
/// the session.
async fn pump(
    inner: Arc<Inner>,
    id: String,
    mut stream: CaptureStream,
    mut updates: mpsc::UnboundedReceiver<RecognitionUpdate>,
    stop: Arc<Notify>,
) {
    let mut failure: Option<VoiceError> = None;
    loop {
        tokio::select! {
            () = stop.notified() => break,
            chunk = stream.next_chunk() => match chunk {
                Some(chunk) => {
                    if let Err(e) = inner
                        .transport
                        .send_chunk(&id, PCM16_FORMAT, chunk.data)
                        .await
                    {
                        failure = Some(e);
                        break;
                    }
                }
                None => break,
            },
            update = updates.recv() => match update {
                Some(RecognitionUpdate::Interim { text, confidence }) => {
                    inner.events.emit(&TranscriptEvent::Interim { text, confidence });
                }
                Some(RecognitionUpdate::Final { text, confidence }) => {
                    inner.events.emit(&TranscriptEvent::Final { text, confidence });
                }
                Some(RecognitionUpdate::EndOfSpeech) => {
                    tracing::debug!(target: "stt", id, "server signalled end of speech");
                    break;
                }
                Some(RecognitionUpdate::Error(message)) => {
                    failure = Some(VoiceError::RecordingFailed(message));
                    break;
                }
                Some(RecognitionUpdate::ConnectionLost) | None => {
                    failure = Some(VoiceError::ConnectionFailed(
                        "connection lost during recognition".into(),
                    ));
                    break;
                }
            },
        }
    }

    // Releases the capture device; the stream is the device ownership token.
    drop(stream);
    finish(&inner, &id, failure).await;
}

/// Server-driven cleanup path. If a caller `stop` already took the session,
/// this is a no-op and that caller owns the rest of the teardown.
async fn finish(inner: &Arc<Inner>, id: &str, failure: Option<VoiceError>) {
    let owned = {
        let mut active = inner.active.lock().await;
        match active.as_ref() {
            Some(session) if session.id == id => active.take(),
            _ => None,
        }
    };
    if owned.is_none() {
        return;
    }

    if let Err(e) = inner.transport.stop(id).await {
        tracing::debug!(target: "stt", id, error = %e, "stop envelope not sent");
    }
    match failure {
        Some(error) => {
            *inner.state.lock() = SessionState::Errored;
            tracing::warn!(target: "stt", id, error = %error, "recognition session failed");
            inner.events.emit(&TranscriptEvent::Error { error });
        }
        None => {
            *inner.state.lock() = SessionState::Idle;
        }
    }
    inner.events.emit(&TranscriptEvent::Ended);
}
