//! Bounded, time-expiring synthesis result cache.

use crate::types::SynthesisResult;
use atlas_foundation::{CacheConfig, SharedClock};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

type CacheKey = (String, String); // (voice, text)

struct CacheEntry {
    result: Arc<SynthesisResult>,
    inserted_at: Instant,
}

/// Shared cache of synthesized utterances keyed by `(voice, text)`.
///
/// Eviction is strictly by insertion order: at capacity the oldest-inserted
/// entry goes first, and reads never reorder anything. Entries past the TTL
/// are treated as absent on lookup and evicted then. Results are
/// reference-counted so the playback pipeline and the cache share one
/// allocation.
pub struct SynthesisCache {
    inner: Mutex<Inner>,
    clock: SharedClock,
    capacity: usize,
    ttl: Duration,
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<CacheKey>,
}

impl SynthesisCache {
    pub fn new(config: &CacheConfig, clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            clock,
            capacity: config.capacity.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    pub fn get(&self, text: &str, voice: &str) -> Option<Arc<SynthesisResult>> {
        let key = (voice.to_owned(), text.to_owned());
        let mut inner = self.inner.lock();
        let entry = inner.entries.get(&key)?;
        if self.clock.now().duration_since(entry.inserted_at) > self.ttl {
            inner.entries.remove(&key);
            inner.order.retain(|k| *k != key);
            tracing::debug!(target: "speech", voice, text, "cache entry expired");
            return None;
        }
        Some(Arc::clone(&inner.entries[&key].result))
    }

    pub fn insert(&self, text: &str, voice: &str, result: Arc<SynthesisResult>) {
        let key = (voice.to_owned(), text.to_owned());
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            // Re-insert refreshes both the timestamp and the eviction slot.
            inner.order.retain(|k| *k != key);
        } else if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: self.clock.now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_foundation::{test_clock, TestClock};

    fn result() -> Arc<SynthesisResult> {
        Arc::new(SynthesisResult {
            audio: vec![0u8; 8],
            visemes: Arc::from([]),
            duration: Duration::from_millis(100),
            sample_rate: 24_000,
            format: "wav".into(),
        })
    }

    fn cache(capacity: usize, ttl_secs: u64) -> (SynthesisCache, Arc<TestClock>) {
        let clock = test_clock();
        let config = CacheConfig { capacity, ttl_secs };
        (SynthesisCache::new(&config, clock.clone()), clock)
    }

    #[test]
    fn get_after_insert_returns_shared_result() {
        let (cache, _clock) = cache(4, 300);
        let stored = result();
        cache.insert("hello", "voiceA", stored.clone());
        let hit = cache.get("hello", "voiceA").unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
    }

    #[test]
    fn keyed_by_voice_and_text() {
        let (cache, _clock) = cache(4, 300);
        cache.insert("hello", "voiceA", result());
        assert!(cache.get("hello", "voiceB").is_none());
        assert!(cache.get("other", "voiceA").is_none());
    }

    #[test]
    fn capacity_overflow_evicts_oldest_inserted() {
        let (cache, _clock) = cache(2, 300);
        cache.insert("one", "v", result());
        cache.insert("two", "v", result());
        // Reads must not affect eviction order.
        assert!(cache.get("one", "v").is_some());
        cache.insert("three", "v", result());
        assert!(cache.get("one", "v").is_none());
        assert!(cache.get("two", "v").is_some());
        assert!(cache.get("three", "v").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn expired_entry_is_absent_and_removed() {
        let (cache, clock) = cache(4, 60);
        cache.insert("hello", "v", result());
        clock.advance(Duration::from_secs(61));
        assert!(cache.get("hello", "v").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn entry_at_exact_ttl_still_valid() {
        let (cache, clock) = cache(4, 60);
        cache.insert("hello", "v", result());
        clock.advance(Duration::from_secs(60));
        assert!(cache.get("hello", "v").is_some());
    }

    #[test]
    fn reinsert_refreshes_timestamp_and_slot() {
        let (cache, clock) = cache(2, 60);
        cache.insert("one", "v", result());
        clock.advance(Duration::from_secs(50));
        cache.insert("two", "v", result());
        cache.insert("one", "v", result());
        clock.advance(Duration::from_secs(20));
        // Refreshed "one" survives the TTL that would have expired it.
        assert!(cache.get("one", "v").is_some());
        // And the overflow now evicts "two", the oldest slot.
        cache.insert("three", "v", result());
        assert!(cache.get("two", "v").is_none());
        assert!(cache.get("one", "v").is_some());
    }
}
