//! Wire envelopes for the speech-server protocol.
//!
//! Field names follow the server's JSON exactly (`sampleRate`,
//! `byteLength`); every envelope carries a `type` tag and, except for
//! ping/pong, a correlation id.

use serde::{Deserialize, Serialize};

/// Client-to-server control envelopes.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientEnvelope<'a> {
    #[serde(rename = "tts:synthesize")]
    Synthesize {
        id: &'a str,
        text: &'a str,
        voice: &'a str,
    },
    /// Opens a recognition session; sent once per session.
    #[serde(rename = "stt:start")]
    RecognitionStart { id: &'a str, language: &'a str },
    /// Announces one binary audio frame that immediately follows.
    #[serde(rename = "stt:audio")]
    RecognitionAudio { id: &'a str, format: &'a str },
    #[serde(rename = "stt:stop")]
    RecognitionStop { id: &'a str },
    #[serde(rename = "ping")]
    Ping,
}

/// Server-to-client control envelopes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEnvelope {
    /// Announces one binary audio frame that immediately follows.
    #[serde(rename = "tts:result")]
    SynthesisMeta {
        id: String,
        format: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
        #[serde(rename = "byteLength")]
        byte_length: usize,
    },
    #[serde(rename = "tts:error")]
    SynthesisError { id: String, error: String },
    #[serde(rename = "stt:interim")]
    Interim {
        id: String,
        text: String,
        #[serde(default)]
        confidence: f32,
    },
    #[serde(rename = "stt:final")]
    Final {
        id: String,
        text: String,
        #[serde(default)]
        confidence: f32,
    },
    #[serde(rename = "stt:end-of-speech")]
    EndOfSpeech { id: String },
    #[serde(rename = "stt:error")]
    RecognitionError { id: String, error: String },
    #[serde(rename = "pong")]
    Pong,
}

/// Completed synthesis response: the audio frame plus its announced metadata.
#[derive(Debug, Clone)]
pub struct SynthesisPayload {
    pub audio: Vec<u8>,
    pub format: String,
    pub sample_rate: u32,
}

/// Recognition-session messages dispatched to the active session owner.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionUpdate {
    Interim { text: String, confidence: f32 },
    Final { text: String, confidence: f32 },
    /// Server detected sustained silence and ended the session.
    EndOfSpeech,
    Error(String),
    /// The underlying connection dropped mid-session.
    ConnectionLost,
}
