//! Deduplicating work queue.
//!
//! Three pieces of state live under one mutex: the ordered queue, the
//! `dirty` set (keys that need processing) and the `processing` set (keys
//! currently checked out by a worker). A key is in `queue` only if it is in
//! `dirty` and not in `processing`, so any key has at most one pending
//! occurrence no matter how many times it is added.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::telemetry::metrics;

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

struct Shared<K> {
    name: String,
    state: Mutex<State<K>>,
    notify: Notify,
    stopped: CancellationToken,
}

/// Cloneable handle to a shared work queue.
pub struct WorkQueue<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Display + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                stopped: CancellationToken::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        // Every mutation completes before its guard drops, so a poisoned
        // lock still holds consistent state.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `item` as needing processing.
    ///
    /// A no-op if it is already queued. If a worker currently holds it, the
    /// item is requeued when that worker calls [`done`](Self::done).
    /// Ignored once the queue is shutting down.
    pub fn add(&self, item: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }

        metrics::queue_adds().add(1, &[KeyValue::new("queue", self.shared.name.clone())]);
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            debug!(queue = %self.shared.name, key = %item, "key in flight, deferring re-add");
            return;
        }

        state.queue.push_back(item);
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is shut down and every item queued
    /// before the shutdown has been handed out. The returned item must be
    /// passed back to [`done`](Self::done).
    pub async fn get(&self) -> Option<K> {
        loop {
            // Register interest before checking so a concurrent `add` or
            // `shut_down` between the check and the await is not missed.
            let notified = self.shared.notify.notified();
            {
                let mut state = self.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        // Pass the baton so other idle workers see the backlog.
                        self.shared.notify.notify_one();
                    }
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark `item` as finished. If it was added again while being
    /// processed, it goes back on the queue now.
    pub fn done(&self, item: &K) {
        let mut state = self.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.shared.notify.notify_one();
        }
    }

    /// Stop accepting new items and wake every blocked [`get`](Self::get).
    /// Idempotent.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;
        drop(state);

        debug!(queue = %self.shared.name, "queue shutting down");
        self.shared.stopped.cancel();
        self.shared.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of items waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Token cancelled by [`shut_down`](Self::shut_down). Deferred adds
    /// watch it so pending timers die with the queue.
    pub(crate) fn stopped(&self) -> &CancellationToken {
        &self.shared.stopped
    }
}
