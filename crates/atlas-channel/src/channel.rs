//! Duplex channel implementation.

use crate::protocol::{ClientEnvelope, RecognitionUpdate, ServerEnvelope, SynthesisPayload};
use atlas_foundation::{VoiceError, VoiceResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;
type PendingSender = oneshot::Sender<VoiceResult<SynthesisPayload>>;

/// Connection lifecycle: `Closed → Connecting → Open → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Closed = 0,
    Connecting = 1,
    Open = 2,
}

/// Persistent bidirectional channel to the speech server.
///
/// Many synthesis requests may be outstanding at once; at most one
/// recognition session routes inbound transcript envelopes. Connection loss
/// clears all per-connection state but does not auto-retry; `connect` is
/// idempotent and concurrent callers share a single in-flight attempt.
pub struct SpeechChannel {
    url: String,
    request_timeout: Duration,
    conn: tokio::sync::Mutex<Option<Connection>>,
    shared: Arc<Shared>,
}

struct Connection {
    writer: Arc<tokio::sync::Mutex<WsWriter>>,
    reader: tokio::task::JoinHandle<()>,
}

struct Shared {
    state: AtomicU8,
    pending: Mutex<HashMap<String, PendingSender>>,
    recognition: Mutex<Option<RecognitionRoute>>,
}

struct RecognitionRoute {
    id: String,
    tx: mpsc::UnboundedSender<RecognitionUpdate>,
}

impl SpeechChannel {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            request_timeout,
            conn: tokio::sync::Mutex::new(None),
            shared: Arc::new(Shared {
                state: AtomicU8::new(ChannelState::Closed as u8),
                pending: Mutex::new(HashMap::new()),
                recognition: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        match self.shared.state.load(Ordering::Acquire) {
            1 => ChannelState::Connecting,
            2 => ChannelState::Open,
            _ => ChannelState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Open the connection if it is not already open.
    ///
    /// The connection mutex is held for the whole attempt, so concurrent
    /// callers wait on the same dial instead of opening duplicate sockets.
    pub async fn connect(&self) -> VoiceResult<()> {
        let mut conn = self.conn.lock().await;
        if conn.is_some() && self.is_open() {
            return Ok(());
        }
        if let Some(stale) = conn.take() {
            stale.reader.abort();
        }

        self.shared
            .state
            .store(ChannelState::Connecting as u8, Ordering::Release);
        let stream = match connect_async(&self.url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                self.shared
                    .state
                    .store(ChannelState::Closed as u8, Ordering::Release);
                return Err(VoiceError::ConnectionFailed(e.to_string()));
            }
        };
        tracing::info!(target: "channel", url = %self.url, "connected to speech server");

        let (writer, reader) = stream.split();
        self.shared
            .state
            .store(ChannelState::Open as u8, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        *conn = Some(Connection {
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            reader: tokio::spawn(read_loop(reader, shared)),
        });
        Ok(())
    }

    /// Send one synthesis request and await its correlated response.
    ///
    /// Exactly one of three outcomes resolves the pending entry: the audio
    /// payload, a server error envelope, or the per-request timeout. Firing
    /// the timeout removes the entry so a late response is silently dropped.
    pub async fn synthesize(
        &self,
        id: &str,
        text: &str,
        voice: &str,
    ) -> VoiceResult<SynthesisPayload> {
        let writer = self.writer().await?;
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.to_owned(), tx);

        let envelope = encode(&ClientEnvelope::Synthesize { id, text, voice })?;
        if let Err(e) = writer.lock().await.send(Message::Text(envelope)).await {
            self.shared.pending.lock().remove(id);
            return Err(VoiceError::ConnectionFailed(e.to_string()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(VoiceError::ConnectionFailed(
                "connection lost while awaiting synthesis".into(),
            )),
            Err(_) => {
                self.shared.pending.lock().remove(id);
                tracing::warn!(target: "channel", id, "synthesis request timed out");
                Err(VoiceError::SynthesisTimeout(self.request_timeout))
            }
        }
    }

    /// Reject an outstanding synthesis request with `Stopped`.
    ///
    /// No-op if the request already resolved. Any response arriving later
    /// finds no pending entry and is dropped.
    pub fn cancel_request(&self, id: &str) {
        if let Some(tx) = self.shared.pending.lock().remove(id) {
            let _ = tx.send(Err(VoiceError::Stopped));
            tracing::debug!(target: "channel", id, "synthesis request cancelled");
        }
    }

    /// Open a recognition session and return its inbound update stream.
    ///
    /// A new session supersedes any previous route: envelopes carrying a
    /// stale session id are discarded on receipt.
    pub async fn start_recognition(
        &self,
        id: &str,
        language: &str,
    ) -> VoiceResult<mpsc::UnboundedReceiver<RecognitionUpdate>> {
        let writer = self.writer().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.recognition.lock() = Some(RecognitionRoute {
            id: id.to_owned(),
            tx,
        });

        let envelope = encode(&ClientEnvelope::RecognitionStart { id, language })?;
        if let Err(e) = writer.lock().await.send(Message::Text(envelope)).await {
            *self.shared.recognition.lock() = None;
            return Err(VoiceError::ConnectionFailed(e.to_string()));
        }
        tracing::debug!(target: "channel", id, language, "recognition session started");
        Ok(rx)
    }

    /// Stream one captured audio frame into the active recognition session.
    ///
    /// The announcing envelope and the binary frame are sent under a single
    /// writer lock so pairs never interleave with other senders.
    pub async fn send_audio(&self, id: &str, format: &str, frame: Vec<u8>) -> VoiceResult<()> {
        let writer = self.writer().await?;
        let envelope = encode(&ClientEnvelope::RecognitionAudio { id, format })?;
        let mut w = writer.lock().await;
        w.send(Message::Text(envelope))
            .await
            .map_err(|e| VoiceError::ConnectionFailed(e.to_string()))?;
        w.send(Message::Binary(frame))
            .await
            .map_err(|e| VoiceError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    /// Close the recognition session and drop its route.
    pub async fn stop_recognition(&self, id: &str) -> VoiceResult<()> {
        let writer = self.writer().await?;
        let envelope = encode(&ClientEnvelope::RecognitionStop { id })?;
        let result = writer
            .lock()
            .await
            .send(Message::Text(envelope))
            .await
            .map_err(|e| VoiceError::ConnectionFailed(e.to_string()));

        let mut route = self.shared.recognition.lock();
        if route.as_ref().is_some_and(|r| r.id == id) {
            *route = None;
        }
        result
    }

    /// Keepalive probe; the server answers with a pong envelope.
    pub async fn ping(&self) -> VoiceResult<()> {
        let writer = self.writer().await?;
        let envelope = encode(&ClientEnvelope::Ping)?;
        writer
            .lock()
            .await
            .send(Message::Text(envelope))
            .await
            .map_err(|e| VoiceError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    async fn writer(&self) -> VoiceResult<Arc<tokio::sync::Mutex<WsWriter>>> {
        let conn = self.conn.lock().await;
        match conn.as_ref() {
            Some(c) if self.is_open() => Ok(Arc::clone(&c.writer)),
            _ => Err(VoiceError::ConnectionFailed("channel is not open".into())),
        }
    }
}

fn encode(envelope: &ClientEnvelope<'_>) -> VoiceResult<String> {
    serde_json::to_string(envelope)
        .map_err(|e| VoiceError::ConnectionFailed(format!("envelope encoding failed: {e}")))
}

/// Inbound dispatch loop; one per connection.
///
/// A binary frame is always the payload of the most recently announced
/// `tts:result` envelope. The protocol relies on the socket preserving
/// message order, so the pair cannot be split by other traffic.
async fn read_loop(mut reader: WsReader, shared: Arc<Shared>) {
    let mut announced: Option<(String, String, u32, usize)> = None;

    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerEnvelope>(&text) {
                Ok(envelope) => dispatch(envelope, &shared, &mut announced),
                Err(e) => {
                    tracing::warn!(target: "channel", "unparseable envelope: {e}");
                }
            },
            Ok(Message::Binary(frame)) => {
                let Some((id, format, sample_rate, byte_length)) = announced.take() else {
                    tracing::warn!(target: "channel", "binary frame with no announced metadata");
                    continue;
                };
                if frame.len() != byte_length {
                    tracing::warn!(
                        target: "channel",
                        id,
                        expected = byte_length,
                        actual = frame.len(),
                        "audio payload length differs from announced byteLength"
                    );
                }
                match shared.pending.lock().remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(Ok(SynthesisPayload {
                            audio: frame,
                            format,
                            sample_rate,
                        }));
                    }
                    // Timed out or cancelled; the response is dropped.
                    None => tracing::debug!(target: "channel", id, "late synthesis response ignored"),
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(target: "channel", "socket error: {e}");
                break;
            }
        }
    }

    shared.drop_connection();
}

fn dispatch(
    envelope: ServerEnvelope,
    shared: &Shared,
    announced: &mut Option<(String, String, u32, usize)>,
) {
    match envelope {
        ServerEnvelope::SynthesisMeta {
            id,
            format,
            sample_rate,
            byte_length,
        } => {
            if let Some((stale, ..)) = announced.replace((id, format, sample_rate, byte_length)) {
                tracing::warn!(target: "channel", id = stale, "metadata announced without payload");
            }
        }
        ServerEnvelope::SynthesisError { id, error } => {
            match shared.pending.lock().remove(&id) {
                Some(tx) => {
                    let _ = tx.send(Err(VoiceError::SynthesisRejected(error)));
                }
                None => tracing::debug!(target: "channel", id, "late synthesis error ignored"),
            }
        }
        ServerEnvelope::Interim {
            id,
            text,
            confidence,
        } => shared.route(&id, RecognitionUpdate::Interim { text, confidence }),
        ServerEnvelope::Final {
            id,
            text,
            confidence,
        } => shared.route(&id, RecognitionUpdate::Final { text, confidence }),
        ServerEnvelope::EndOfSpeech { id } => shared.route(&id, RecognitionUpdate::EndOfSpeech),
        ServerEnvelope::RecognitionError { id, error } => {
            shared.route(&id, RecognitionUpdate::Error(error));
        }
        ServerEnvelope::Pong => tracing::debug!(target: "channel", "pong"),
    }
}

impl Shared {
    /// Forward a recognition update if `id` matches the active session;
    /// messages from superseded sessions are discarded.
    fn route(&self, id: &str, update: RecognitionUpdate) {
        let route = self.recognition.lock();
        match route.as_ref() {
            Some(r) if r.id == id => {
                let _ = r.tx.send(update);
            }
            _ => tracing::debug!(target: "channel", id, "stale recognition envelope discarded"),
        }
    }

    /// Clear all per-connection state after the socket closes. Outstanding
    /// requests fail immediately; callers must re-invoke `connect`.
    fn drop_connection(&self) {
        self.state
            .store(ChannelState::Closed as u8, Ordering::Release);
        let pending: Vec<PendingSender> = {
            let mut map = self.pending.lock();
            map.drain().map(|(_, tx)| tx).collect()
        };
        for tx in pending {
            let _ = tx.send(Err(VoiceError::ConnectionFailed(
                "connection to speech server lost".into(),
            )));
        }
        if let Some(route) = self.recognition.lock().take() {
            let _ = route.tx.send(RecognitionUpdate::ConnectionLost);
        }
        tracing::info!(target: "channel", "connection closed");
    }
}
