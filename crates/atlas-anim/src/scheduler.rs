//! Queue playback against the runtime clock.

use crate::entry::{AnimationEntry, AnimationTrigger};
use atlas_foundation::{AnimConfig, EventRegistry};
use atlas_viseme::VisemeEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Plays an ordered queue of animation entries.
///
/// The timeline starts when the queue goes from empty to non-empty; entry
/// offsets are relative to that instant. At most one entry is current. When
/// a successor is scheduled to begin before the current entry ends, a
/// crossfade trigger replaces the current entry's finish. `cancel` drops the
/// whole queue immediately and may be called at any time.
#[derive(Clone)]
pub struct AnimationScheduler {
    inner: Arc<Inner>,
    _worker: Arc<WorkerGuard>,
}

struct WorkerGuard(JoinHandle<()>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Inner {
    crossfade: Duration,
    viseme_fade: Duration,
    events: EventRegistry<AnimationTrigger>,
    queue: Mutex<VecDeque<AnimationEntry>>,
    // End offset of the furthest queued entry; viseme batches append here.
    tail: Mutex<Duration>,
    timeline: Mutex<Option<Instant>>,
    active: AtomicBool,
    epoch: AtomicU64,
    wake: Notify,
    cancelled: Notify,
}

impl AnimationScheduler {
    pub fn new(config: &AnimConfig) -> Self {
        let inner = Arc::new(Inner {
            crossfade: Duration::from_millis(config.crossfade_ms),
            viseme_fade: Duration::from_millis(config.viseme_fade_ms),
            events: EventRegistry::new(),
            queue: Mutex::new(VecDeque::new()),
            tail: Mutex::new(Duration::ZERO),
            timeline: Mutex::new(None),
            active: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            wake: Notify::new(),
            cancelled: Notify::new(),
        });
        let worker = tokio::spawn(run(Arc::clone(&inner)));
        Self {
            inner,
            _worker: Arc::new(WorkerGuard(worker)),
        }
    }

    /// Triggers in playback order: started, crossfade/finished, cancelled.
    pub fn events(&self) -> &EventRegistry<AnimationTrigger> {
        &self.inner.events
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn queued(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Add one entry to the queue.
    pub fn enqueue(&self, entry: AnimationEntry) {
        {
            let mut tail = self.inner.tail.lock();
            *tail = (*tail).max(entry.end());
        }
        self.inner.queue.lock().push_back(entry);
        self.inner.active.store(true, Ordering::Release);
        self.inner.wake.notify_one();
    }

    /// Append a viseme timeline after everything already queued.
    ///
    /// Each event becomes one entry named after its mouth shape, with the
    /// configured viseme fade on both edges.
    pub fn enqueue_visemes(&self, visemes: &[VisemeEvent]) {
        if visemes.is_empty() {
            return;
        }
        let mut offset = *self.inner.tail.lock();
        let entries: Vec<AnimationEntry> = visemes
            .iter()
            .map(|event| {
                let entry = AnimationEntry::new(event.viseme.label(), offset, event.duration)
                    .with_weight(event.weight)
                    .with_fades(self.inner.viseme_fade, self.inner.viseme_fade);
                offset += event.duration;
                entry
            })
            .collect();
        {
            let mut queue = self.inner.queue.lock();
            queue.extend(entries);
        }
        *self.inner.tail.lock() = offset;
        self.inner.active.store(true, Ordering::Release);
        self.inner.wake.notify_one();
    }

    /// Drop the whole queue and interrupt the current entry immediately.
    /// A second cancel while idle is a no-op.
    pub fn cancel(&self) {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::AcqRel);
        let cleared = {
            let mut queue = inner.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        *inner.tail.lock() = Duration::ZERO;
        *inner.timeline.lock() = None;
        inner.cancelled.notify_waiters();
        if inner.active.swap(false, Ordering::AcqRel) {
            inner.events.emit(&AnimationTrigger::Cancelled);
            tracing::debug!(target: "anim", cleared, "animation queue cancelled");
        }
    }
}

async fn run(inner: Arc<Inner>) {
    loop {
        let notified = inner.wake.notified();
        loop {
            let entry = inner.queue.lock().pop_front();
            match entry {
                Some(entry) => {
                    if !inner.play_entry(entry).await {
                        break;
                    }
                }
                None => break,
            }
        }
        if inner.queue.lock().is_empty() {
            *inner.timeline.lock() = None;
            *inner.tail.lock() = Duration::ZERO;
            inner.active.store(false, Ordering::Release);
        }
        notified.await;
    }
}

impl Inner {
    /// Play one entry to its finish or crossfade point. Returns `false` if
    /// cancellation interrupted it.
    async fn play_entry(&self, entry: AnimationEntry) -> bool {
        let epoch = self.epoch.load(Ordering::Acquire);
        if !self.sleep_to_offset(entry.at, epoch).await {
            return false;
        }
        self.events.emit(&AnimationTrigger::Started {
            name: entry.name.clone(),
            weight: entry.weight,
            fade_in: entry.fade_in,
        });

        let successor = self
            .queue
            .lock()
            .front()
            .map(|next| (next.name.clone(), next.at));
        match successor {
            Some((to, next_at)) if next_at < entry.end() => {
                let overlap = (entry.end() - next_at).min(self.crossfade);
                if !self.sleep_to_offset(next_at, epoch).await {
                    return false;
                }
                self.events.emit(&AnimationTrigger::Crossfade {
                    from: entry.name,
                    to,
                    overlap,
                });
            }
            _ => {
                if !self.sleep_to_offset(entry.end(), epoch).await {
                    return false;
                }
                self.events.emit(&AnimationTrigger::Finished { name: entry.name });
            }
        }
        true
    }

    /// Sleep until `offset` on the current timeline, anchoring the timeline
    /// if this is the first entry. Returns `false` on cancellation.
    async fn sleep_to_offset(&self, offset: Duration, epoch: u64) -> bool {
        let deadline = {
            let mut timeline = self.timeline.lock();
            *timeline.get_or_insert_with(Instant::now) + offset
        };
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => {}
            () = self.cancelled.notified() => return false,
        }
        self.epoch.load(Ordering::Acquire) == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_viseme::Viseme;

    type Log = Arc<Mutex<Vec<(String, Duration)>>>;

    fn scheduler() -> AnimationScheduler {
        AnimationScheduler::new(&AnimConfig::default())
    }

    fn record(scheduler: &AnimationScheduler) -> Log {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let started = Instant::now();
        scheduler.events().subscribe(move |trigger: &AnimationTrigger| {
            let tag = match trigger {
                AnimationTrigger::Started { name, .. } => format!("start:{name}"),
                AnimationTrigger::Crossfade { from, to, overlap } => {
                    format!("fade:{from}>{to}@{}", overlap.as_millis())
                }
                AnimationTrigger::Finished { name } => format!("end:{name}"),
                AnimationTrigger::Cancelled => "cancelled".into(),
            };
            sink.lock().push((tag, started.elapsed()));
        });
        log
    }

    async fn wait_idle(scheduler: &AnimationScheduler) {
        while scheduler.is_active() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[tokio::test(start_paused = true)]
    async fn entries_fire_at_their_offsets_in_order() {
        let scheduler = scheduler();
        let log = record(&scheduler);
        scheduler.enqueue(AnimationEntry::new("wave", Duration::ZERO, secs(1)));
        scheduler.enqueue(AnimationEntry::new("nod", secs(2), secs(1)));
        wait_idle(&scheduler).await;

        let log = log.lock();
        let tags: Vec<&str> = log.iter().map(|(tag, _)| tag.as_str()).collect();
        assert_eq!(tags, vec!["start:wave", "end:wave", "start:nod", "end:nod"]);
        assert_eq!(log[0].1, Duration::ZERO);
        assert_eq!(log[1].1, secs(1));
        assert_eq!(log[2].1, secs(2));
        assert_eq!(log[3].1, secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_entries_crossfade_instead_of_finishing() {
        let scheduler = scheduler();
        let log = record(&scheduler);
        scheduler.enqueue(
            AnimationEntry::new("wave", Duration::ZERO, secs(1)).with_fades(millis(0), millis(100)),
        );
        scheduler.enqueue(AnimationEntry::new("nod", millis(900), secs(1)));
        wait_idle(&scheduler).await;

        let log = log.lock();
        let tags: Vec<&str> = log.iter().map(|(tag, _)| tag.as_str()).collect();
        assert_eq!(
            tags,
            vec!["start:wave", "fade:wave>nod@100", "start:nod", "end:nod"]
        );
        // The crossfade lands where the successor begins.
        assert_eq!(log[1].1, millis(900));
        assert_eq!(log[2].1, millis(900));
        assert_eq!(log[3].1, millis(1900));
    }

    #[tokio::test(start_paused = true)]
    async fn crossfade_overlap_is_capped_by_config() {
        let scheduler = scheduler();
        let log = record(&scheduler);
        scheduler.enqueue(AnimationEntry::new("a", Duration::ZERO, secs(1)));
        // Scheduled overlap of 500 ms, config caps at 120 ms.
        scheduler.enqueue(AnimationEntry::new("b", millis(500), secs(1)));
        wait_idle(&scheduler).await;

        let log = log.lock();
        assert!(log.iter().any(|(tag, _)| tag == "fade:a>b@120"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_queue_and_interrupts_current() {
        let scheduler = scheduler();
        let log = record(&scheduler);
        scheduler.enqueue(AnimationEntry::new("wave", Duration::ZERO, secs(10)));
        scheduler.enqueue(AnimationEntry::new("nod", secs(10), secs(10)));
        tokio::time::sleep(millis(100)).await;

        scheduler.cancel();
        tokio::time::sleep(secs(30)).await;

        let tags: Vec<String> = log.lock().iter().map(|(tag, _)| tag.clone()).collect();
        assert_eq!(tags, vec!["start:wave", "cancelled"]);
        assert_eq!(scheduler.queued(), 0);
        assert!(!scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_idle_emits_nothing() {
        let scheduler = scheduler();
        let log = record(&scheduler);
        scheduler.cancel();
        scheduler.cancel();
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn viseme_batch_plays_back_to_back() {
        let scheduler = scheduler();
        let log = record(&scheduler);
        let visemes = [
            VisemeEvent {
                viseme: Viseme::Silence,
                weight: 0.0,
                duration: millis(50),
            },
            VisemeEvent {
                viseme: Viseme::Aa,
                weight: 1.0,
                duration: millis(200),
            },
            VisemeEvent {
                viseme: Viseme::Silence,
                weight: 0.0,
                duration: millis(50),
            },
        ];
        scheduler.enqueue_visemes(&visemes);
        wait_idle(&scheduler).await;

        let log = log.lock();
        let tags: Vec<&str> = log.iter().map(|(tag, _)| tag.as_str()).collect();
        assert_eq!(
            tags,
            vec![
                "start:sil",
                "end:sil",
                "start:aa",
                "end:aa",
                "start:sil",
                "end:sil",
            ]
        );
        // Offsets accumulate across the batch.
        assert_eq!(log[2].1, millis(50));
        assert_eq!(log[4].1, millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn timeline_restarts_after_queue_drains() {
        let scheduler = scheduler();
        let log = record(&scheduler);
        scheduler.enqueue(AnimationEntry::new("first", Duration::ZERO, millis(100)));
        wait_idle(&scheduler).await;

        tokio::time::sleep(secs(5)).await;
        scheduler.enqueue(AnimationEntry::new("second", Duration::ZERO, millis(100)));
        wait_idle(&scheduler).await;

        let log = log.lock();
        let second_start = log
            .iter()
            .find(|(tag, _)| tag == "start:second")
            .map(|(_, at)| *at)
            .unwrap();
        assert!(second_start >= secs(5));
    }
}
