//! Persistent duplex channel to the speech server.
//!
//! One WebSocket connection carries every synthesis request and at most one
//! active recognition session, multiplexed by opaque request ids. Control
//! messages are JSON envelopes; audio payloads travel as binary frames bound
//! to the most recently announced metadata envelope.

mod channel;
mod protocol;

pub use channel::{ChannelState, SpeechChannel};
pub use protocol::{ClientEnvelope, RecognitionUpdate, ServerEnvelope, SynthesisPayload};
