//! Text-to-viseme timeline generation.

use crate::types::{Viseme, VisemeClass, VisemeEvent};
use atlas_foundation::VisemeConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

type MemoKey = (String, Option<u64>);

/// Generates timed viseme sequences from text.
///
/// Results are memoized by `(text, duration_hint)` in a small bounded cache
/// (oldest entry evicted first) since the same segment is frequently
/// re-animated after a synthesis cache hit.
pub struct VisemeGenerator {
    config: VisemeConfig,
    memo: Mutex<Memo>,
}

struct Memo {
    entries: HashMap<MemoKey, Arc<[VisemeEvent]>>,
    order: VecDeque<MemoKey>,
    capacity: usize,
}

impl VisemeGenerator {
    pub fn new(config: VisemeConfig) -> Self {
        let capacity = config.memo_capacity.max(1);
        Self {
            config,
            memo: Mutex::new(Memo {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
        }
    }

    /// Generate the timeline for `text`.
    ///
    /// Total duration is `duration_hint` if given, otherwise estimated from
    /// text length. The returned sequence is non-empty and starts and ends
    /// with [`Viseme::Silence`]; event durations sum to the total.
    pub fn generate(&self, text: &str, duration_hint: Option<Duration>) -> Arc<[VisemeEvent]> {
        let key = (text.to_string(), duration_hint.map(|d| d.as_millis() as u64));
        if let Some(hit) = self.memo.lock().entries.get(&key) {
            return Arc::clone(hit);
        }

        let events: Arc<[VisemeEvent]> = self.build(text, duration_hint).into();

        let mut memo = self.memo.lock();
        if !memo.entries.contains_key(&key) {
            if memo.entries.len() >= memo.capacity {
                if let Some(oldest) = memo.order.pop_front() {
                    memo.entries.remove(&oldest);
                }
            }
            memo.order.push_back(key.clone());
            memo.entries.insert(key, Arc::clone(&events));
        }
        events
    }

    fn build(&self, text: &str, duration_hint: Option<Duration>) -> Vec<VisemeEvent> {
        let visemes = scan(text);
        let char_count = text.chars().count();
        let total = duration_hint
            .unwrap_or_else(|| secs(self.config.seconds_per_char * char_count as f64));

        if visemes.is_empty() {
            let duration = if total.is_zero() {
                Duration::from_millis(self.config.silence_padding_ms)
            } else {
                total
            };
            return vec![VisemeEvent {
                viseme: Viseme::Silence,
                weight: 0.0,
                duration,
            }];
        }

        let prepend = visemes.first() != Some(&Viseme::Silence);
        let append = visemes.last() != Some(&Viseme::Silence);
        let pad_count = usize::from(prepend) + usize::from(append);
        // Bookends shrink if the hinted duration cannot fit them.
        let pad = Duration::from_millis(self.config.silence_padding_ms)
            .min(total / (pad_count.max(1) as u32 * 2));
        let inner_total = total.saturating_sub(pad * pad_count as u32);

        let mut events = Vec::with_capacity(visemes.len() + pad_count);
        if prepend {
            events.push(VisemeEvent {
                viseme: Viseme::Silence,
                weight: 0.0,
                duration: pad,
            });
        }

        let n = visemes.len() as u32;
        let per_event = inner_total / n;
        let mut prev: Option<(Viseme, f32)> = None;
        for viseme in &visemes {
            let weight = match prev {
                // Repeating the same non-silence shape damps it so the mouth
                // does not look stuck.
                Some((p, w)) if p == *viseme && *viseme != Viseme::Silence => {
                    w * self.config.repeat_damping
                }
                _ => self.base_weight(viseme.class()),
            };
            prev = Some((*viseme, weight));
            events.push(VisemeEvent {
                viseme: *viseme,
                weight,
                duration: per_event,
            });
        }
        // Division truncates; park the remainder on the last scanned event so
        // durations sum exactly to the total.
        let remainder = inner_total.saturating_sub(per_event * n);
        if let Some(last) = events.last_mut() {
            last.duration += remainder;
        }

        if append {
            events.push(VisemeEvent {
                viseme: Viseme::Silence,
                weight: 0.0,
                duration: pad,
            });
        }
        events
    }

    fn base_weight(&self, class: VisemeClass) -> f32 {
        match class {
            VisemeClass::OpenVowel => self.config.open_vowel_weight,
            VisemeClass::ClosedVowel => self.config.closed_vowel_weight,
            VisemeClass::Bilabial => self.config.bilabial_weight,
            VisemeClass::Consonant => self.config.consonant_weight,
            VisemeClass::Silence => 0.0,
        }
    }
}

/// Left-to-right scan: digraphs take precedence over single characters;
/// whitespace and anything unrecognized maps to silence.
fn scan(text: &str) -> Vec<Viseme> {
    let chars: Vec<char> = text.chars().flat_map(|c| c.to_lowercase()).collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if i + 1 < chars.len() {
            if let Some(v) = digraph(chars[i], chars[i + 1]) {
                out.push(v);
                i += 2;
                continue;
            }
        }
        out.push(single(chars[i]));
        i += 1;
    }
    out
}

fn digraph(a: char, b: char) -> Option<Viseme> {
    Some(match (a, b) {
        ('t', 'h') => Viseme::Th,
        ('c', 'h') | ('s', 'h') => Viseme::Ch,
        ('p', 'h') => Viseme::Fv,
        ('e', 'e') | ('e', 'a') => Viseme::Ee,
        ('o', 'o') | ('o', 'u') => Viseme::Oo,
        ('a', 'i') | ('a', 'y') => Viseme::Aa,
        ('o', 'w') | ('o', 'a') => Viseme::Oh,
        ('q', 'u') => Viseme::Wq,
        ('n', 'g') => Viseme::Kk,
        _ => return None,
    })
}

fn single(c: char) -> Viseme {
    match c {
        'a' => Viseme::Aa,
        'e' | 'i' | 'y' => Viseme::Ee,
        'o' => Viseme::Oh,
        'u' => Viseme::Oo,
        'm' | 'b' | 'p' => Viseme::Mbp,
        'f' | 'v' => Viseme::Fv,
        'd' | 't' | 'n' => Viseme::Dd,
        'g' | 'k' | 'c' => Viseme::Kk,
        'j' => Viseme::Ch,
        's' | 'z' | 'x' => Viseme::Ss,
        'r' => Viseme::Rr,
        'l' => Viseme::L,
        'w' | 'q' => Viseme::Wq,
        'h' => Viseme::Th,
        _ => Viseme::Silence,
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}
