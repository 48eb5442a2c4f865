//! Work queue with delayed, rate-limited re-adds.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::debug;

use super::rate_limiter::{RateLimiter, default_controller_rate_limiter};
use super::work::WorkQueue;
use crate::telemetry::metrics;

/// A [`WorkQueue`] whose failed items come back after a backoff.
pub struct RateLimitingQueue<K> {
    queue: WorkQueue<K>,
    limiter: Arc<dyn RateLimiter<K>>,
}

impl<K> Clone for RateLimitingQueue<K> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<K> RateLimitingQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + Display + 'static,
{
    pub fn new(name: impl Into<String>, limiter: impl RateLimiter<K> + 'static) -> Self {
        Self {
            queue: WorkQueue::new(name),
            limiter: Arc::new(limiter),
        }
    }

    /// Queue using [`default_controller_rate_limiter`].
    pub fn with_default_limiter(name: impl Into<String>) -> Self {
        Self::new(name, default_controller_rate_limiter())
    }

    pub fn add(&self, item: K) {
        self.queue.add(item);
    }

    pub async fn get(&self) -> Option<K> {
        self.queue.get().await
    }

    pub fn done(&self, item: &K) {
        self.queue.done(item);
    }

    pub fn shut_down(&self) {
        self.queue.shut_down();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Re-add `item` once the limiter says it may run again. Bumps its
    /// requeue count.
    pub fn add_rate_limited(&self, item: K) {
        let delay = self.limiter.when(&item);
        metrics::queue_retries().add(1, &[KeyValue::new("queue", self.queue.name().to_string())]);
        self.add_after(item, delay);
    }

    /// Re-add `item` after `delay` without blocking the caller.
    ///
    /// The timer runs on its own task and is dropped if the queue shuts
    /// down first.
    pub fn add_after(&self, item: K, delay: Duration) {
        if self.queue.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.queue.add(item);
            return;
        }

        debug!(
            queue = %self.queue.name(),
            key = %item,
            delay_ms = delay.as_millis() as u64,
            "scheduling re-add"
        );
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = queue.stopped().cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(item),
            }
        });
    }

    /// Reset the failure history of `item`. Call after it succeeds.
    pub fn forget(&self, item: &K) {
        self.limiter.forget(item);
    }

    pub fn num_requeues(&self, item: &K) -> u32 {
        self.limiter.num_requeues(item)
    }
}
