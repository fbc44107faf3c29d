//! Immutable pipeline configuration.
//!
//! One `PipelineConfig` value is constructed up front (defaults, or
//! deserialized from a config file by the binary) and threaded into every
//! component constructor. Components never reach into ambient global state.
//!
//! The timing/weight constants below are empirically tuned values carried
//! over from the production deployment; they are exposed as configuration
//! rather than re-derived.

use serde::Deserialize;

/// Top-level configuration for the voice pipeline.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// WebSocket URL of the speech server.
    pub server_url: String,
    /// Default synthesis voice identifier.
    pub voice: String,
    /// Default recognition language.
    pub language: String,
    pub segment: SegmentConfig,
    pub speech: SpeechConfig,
    pub cache: CacheConfig,
    pub viseme: VisemeConfig,
    pub capture: CaptureConfig,
    pub anim: AnimConfig,
}

impl PipelineConfig {
    /// Defaults pointing at a locally running speech server.
    pub fn local() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8765/ws".to_string(),
            voice: "af_heart".to_string(),
            language: "en".to_string(),
            ..Self::default()
        }
    }
}

/// Text segmentation boundaries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Hard cap on segment length, in characters.
    pub max_chars: usize,
    /// Minimum offset for a preferred whitespace break under the cap.
    pub min_break_offset: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_chars: 200,
            min_break_offset: 50,
        }
    }
}

/// Orchestrator timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Debounce window for incoming text chunks, in milliseconds. Upstream
    /// text arrives in token-sized bursts; coalescing for this window avoids
    /// synthesizing each burst independently.
    pub chunk_debounce_ms: u64,
    /// Per-request synthesis timeout, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            chunk_debounce_ms: 150,
            request_timeout_secs: 30,
        }
    }
}

/// Synthesis result cache bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached results.
    pub capacity: usize,
    /// Entry time-to-live, in seconds. Expired entries are treated as absent
    /// on lookup.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            ttl_secs: 300,
        }
    }
}

/// Viseme timing generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisemeConfig {
    /// Estimated seconds of speech per character when no duration hint is
    /// available.
    pub seconds_per_char: f64,
    /// Weight multiplier applied to consecutive repeats of the same viseme.
    pub repeat_damping: f32,
    /// Duration of the silence bookends, in milliseconds.
    pub silence_padding_ms: u64,
    /// Bound on the memoization cache.
    pub memo_capacity: usize,
    /// Weight for open-vowel mouth shapes.
    pub open_vowel_weight: f32,
    /// Weight for closed-vowel mouth shapes.
    pub closed_vowel_weight: f32,
    /// Weight for bilabial mouth shapes.
    pub bilabial_weight: f32,
    /// Weight for the remaining consonant shapes.
    pub consonant_weight: f32,
}

impl Default for VisemeConfig {
    fn default() -> Self {
        Self {
            seconds_per_char: 0.075,
            repeat_damping: 0.7,
            silence_padding_ms: 50,
            memo_capacity: 64,
            open_vowel_weight: 1.0,
            closed_vowel_weight: 0.75,
            bilabial_weight: 0.5,
            consonant_weight: 0.85,
        }
    }
}

/// Microphone capture framing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Duration of each streamed audio chunk, in milliseconds.
    pub chunk_ms: u64,
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_ms: 1000,
            sample_rate: 16_000,
        }
    }
}

/// Animation scheduling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnimConfig {
    /// Default crossfade window between consecutive entries, in milliseconds.
    pub crossfade_ms: u64,
    /// Default fade applied to viseme-derived entries, in milliseconds.
    pub viseme_fade_ms: u64,
}

impl Default for AnimConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: 120,
            viseme_fade_ms: 40,
        }
    }
}
