//! Scheduled animation data.

use std::time::Duration;

/// One queued animation or viseme trigger.
///
/// `at` is the offset from the start of the current timeline, which begins
/// when the queue transitions from empty to non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationEntry {
    pub name: String,
    pub at: Duration,
    pub duration: Duration,
    pub weight: f32,
    pub fade_in: Duration,
    pub fade_out: Duration,
}

impl AnimationEntry {
    pub fn new(name: impl Into<String>, at: Duration, duration: Duration) -> Self {
        Self {
            name: name.into(),
            at,
            duration,
            weight: 1.0,
            fade_in: Duration::ZERO,
            fade_out: Duration::ZERO,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_fades(mut self, fade_in: Duration, fade_out: Duration) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    pub(crate) fn end(&self) -> Duration {
        self.at + self.duration
    }
}

/// Signals delivered to the rendering layer, in playback order.
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationTrigger {
    /// The entry becomes current; apply `fade_in` from zero to `weight`.
    Started {
        name: String,
        weight: f32,
        fade_in: Duration,
    },
    /// The current entry hands over to the next; blend `from` out while
    /// `to` fades in over `overlap`. Replaces the `Finished` of `from`.
    Crossfade {
        from: String,
        to: String,
        overlap: Duration,
    },
    /// The entry ran to completion with no successor to blend into.
    Finished { name: String },
    /// The whole queue was cancelled; drop any current pose.
    Cancelled,
}
