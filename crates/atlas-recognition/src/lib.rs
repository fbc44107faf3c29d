//! Speech recognition sessions.
//!
//! One session at a time claims the capture device, streams fixed-size audio
//! chunks to the server, and surfaces interim and final transcripts as
//! events. Sessions end on caller stop or on a server end-of-speech signal;
//! both paths share one cleanup routine so the device is released exactly
//! once.

mod session;
mod transport;

pub use session::{RecognitionSession, SessionState, TranscriptEvent};
pub use transport::RecognitionTransport;
