//! Core types for viseme timelines.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Discrete mouth-shape categories driving lip-sync animation.
///
/// A deliberately small alphabet; the renderer maps each category onto a
/// blend-shape of the avatar's mouth rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Viseme {
    /// Mouth at rest. Every timeline starts and ends here.
    Silence,
    /// Open vowel, as in "father".
    Aa,
    /// Rounded open vowel, as in "go".
    Oh,
    /// Spread closed vowel, as in "see".
    Ee,
    /// Rounded closed vowel, as in "food".
    Oo,
    /// Bilabial closure: m, b, p.
    Mbp,
    /// Labiodental: f, v.
    Fv,
    /// Tongue between teeth: th.
    Th,
    /// Alveolar: d, t, n.
    Dd,
    /// Velar: g, k.
    Kk,
    /// Palato-alveolar: ch, sh, j.
    Ch,
    /// Sibilant: s, z.
    Ss,
    /// Rhotic: r.
    Rr,
    /// Lateral: l.
    L,
    /// Rounded glide: w, q.
    Wq,
}

/// Weight classes used to assign per-event intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisemeClass {
    OpenVowel,
    ClosedVowel,
    Bilabial,
    Consonant,
    Silence,
}

impl Viseme {
    pub fn class(self) -> VisemeClass {
        match self {
            Viseme::Silence => VisemeClass::Silence,
            Viseme::Aa | Viseme::Oh => VisemeClass::OpenVowel,
            Viseme::Ee | Viseme::Oo => VisemeClass::ClosedVowel,
            Viseme::Mbp => VisemeClass::Bilabial,
            _ => VisemeClass::Consonant,
        }
    }

    /// Stable label used by the animation layer and the wire format.
    pub fn label(self) -> &'static str {
        match self {
            Viseme::Silence => "sil",
            Viseme::Aa => "aa",
            Viseme::Oh => "oh",
            Viseme::Ee => "ee",
            Viseme::Oo => "oo",
            Viseme::Mbp => "mbp",
            Viseme::Fv => "fv",
            Viseme::Th => "th",
            Viseme::Dd => "dd",
            Viseme::Kk => "kk",
            Viseme::Ch => "ch",
            Viseme::Ss => "ss",
            Viseme::Rr => "rr",
            Viseme::L => "l",
            Viseme::Wq => "wq",
        }
    }
}

/// One entry in a viseme timeline, relative to utterance start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisemeEvent {
    pub viseme: Viseme,
    /// Blend intensity in `[0, 1]`.
    pub weight: f32,
    pub duration: Duration,
}
