//! Typed publish/subscribe registry.
//!
//! Components expose lifecycle signals (speaking started, transcript
//! received, ...) through an `EventRegistry` keyed by subscription handle.
//! Each callback invocation runs inside its own failure boundary so one
//! panicking subscriber cannot break delivery to the others.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    handler: Handler<E>,
    once: bool,
}

/// Handle returned by `subscribe`/`once`; pass back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// Registry of event subscribers for one event type.
pub struct EventRegistry<E> {
    entries: Mutex<HashMap<u64, Entry<E>>>,
    next_id: AtomicU64,
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventRegistry<E> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler invoked on every emitted event.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(Arc::new(handler), false)
    }

    /// Register a handler removed automatically after its first invocation.
    pub fn once<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(Arc::new(handler), true)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.entries.lock().remove(&subscription.0);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// Handlers registered with `once` are removed before delivery so a
    /// re-entrant emit from inside a handler cannot invoke them twice.
    pub fn emit(&self, event: &E) {
        let handlers: Vec<Handler<E>> = {
            let mut entries = self.entries.lock();
            let once_ids: Vec<u64> = entries
                .iter()
                .filter(|(_, e)| e.once)
                .map(|(id, _)| *id)
                .collect();
            let mut handlers: Vec<Handler<E>> =
                entries.values().map(|e| Arc::clone(&e.handler)).collect();
            for id in once_ids {
                entries.remove(&id);
            }
            // HashMap iteration order is arbitrary; delivery order between
            // subscribers is unspecified.
            handlers.shrink_to_fit();
            handlers
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(target: "events", "event subscriber panicked; continuing delivery");
            }
        }
    }

    fn insert(&self, handler: Handler<E>, once: bool) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, Entry { handler, once });
        Subscription(id)
    }
}
