//! Audio capture and playback seams.
//!
//! The recognition pipeline consumes timed raw-audio chunks through the
//! [`CaptureDevice`] trait; a cpal-backed implementation covers real
//! microphones and a scripted mock covers tests. Playback is a trait only:
//! decoding and output are the platform's problem, this crate just defines
//! the completion contract.

mod capture;
mod chunk;
mod device;
mod mock;
mod sink;

pub use capture::CpalCaptureDevice;
pub use chunk::{AudioChunk, PCM16_FORMAT};
pub use device::{CaptureDevice, CaptureStream};
pub use mock::ScriptedCaptureDevice;
pub use sink::{AudioSink, NoopSink};
