use std::time::Duration;
use thiserror::Error;

/// Pipeline-wide error taxonomy.
///
/// Every component surfaces failures through these variants so callers can
/// distinguish recoverable transport/device errors from caller-initiated
/// cancellation. `Stopped` is an expected outcome of `stop()` and must never
/// be logged as a failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceError {
    #[error("channel connection failed: {0}")]
    ConnectionFailed(String),

    #[error("synthesis timed out after {0:?}")]
    SynthesisTimeout(Duration),

    #[error("synthesis rejected by server: {0}")]
    SynthesisRejected(String),

    #[error("operation cancelled by caller")]
    Stopped,

    #[error("capture device unavailable: {0}")]
    DeviceAccessDenied(String),

    #[error("recording failed: {0}")]
    RecordingFailed(String),

    #[error("audio playback failed: {0}")]
    AudioPlaybackFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl VoiceError {
    /// Whether this error is an expected consequence of cancellation rather
    /// than a genuine failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, VoiceError::Stopped)
    }

    /// Whether the caller may reasonably retry the failed operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VoiceError::ConnectionFailed(_)
                | VoiceError::SynthesisTimeout(_)
                | VoiceError::DeviceAccessDenied(_)
                | VoiceError::RecordingFailed(_)
        )
    }
}

pub type VoiceResult<T> = Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_is_cancellation_only() {
        assert!(VoiceError::Stopped.is_cancellation());
        assert!(!VoiceError::SynthesisRejected("bad".into()).is_cancellation());
    }

    #[test]
    fn transport_and_device_errors_are_recoverable() {
        assert!(VoiceError::ConnectionFailed("refused".into()).is_recoverable());
        assert!(VoiceError::DeviceAccessDenied("busy".into()).is_recoverable());
        assert!(!VoiceError::InvalidInput("empty".into()).is_recoverable());
        assert!(!VoiceError::Stopped.is_recoverable());
    }
}
