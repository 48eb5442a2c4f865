//! List-then-watch loop that keeps a [`Store`] current and turns object
//! changes into queue keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Store;
use crate::error::Result;
use crate::model::{Key, Resource};
use crate::queue::RateLimitingQueue;
use crate::telemetry::metrics;

/// One change observed on the watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

impl<T> WatchEvent<T> {
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "added",
            WatchEvent::Modified(_) => "modified",
            WatchEvent::Deleted(_) => "deleted",
        }
    }
}

/// A full listing plus the version to start watching from.
#[derive(Debug, Clone)]
pub struct ObjectList<T> {
    pub items: Vec<T>,
    pub resource_version: String,
}

/// Anything that can list a collection and stream changes to it.
#[async_trait]
pub trait WatchSource<T: Send + 'static>: Send + Sync {
    async fn list(&self) -> Result<ObjectList<T>>;

    /// Stream changes after `resource_version`. The stream ending without an
    /// error means the server closed it and the watch can be resumed.
    async fn watch(&self, resource_version: &str)
    -> Result<BoxStream<'static, Result<WatchEvent<T>>>>;
}

pub struct Informer<T: Resource> {
    source: Arc<dyn WatchSource<T>>,
    store: Arc<Store<T>>,
    queue: RateLimitingQueue<Key>,
    relist_backoff: Duration,
}

impl<T: Resource> Informer<T> {
    pub fn new(
        source: Arc<dyn WatchSource<T>>,
        store: Arc<Store<T>>,
        queue: RateLimitingQueue<Key>,
    ) -> Self {
        Self {
            source,
            store,
            queue,
            relist_backoff: Duration::from_secs(1),
        }
    }

    /// Pause between a failed list/watch and the next relist.
    pub fn relist_backoff(mut self, backoff: Duration) -> Self {
        self.relist_backoff = backoff;
        self
    }

    pub fn store(&self) -> &Arc<Store<T>> {
        &self.store
    }

    /// Run until `shutdown` fires. Errors are logged and followed by a relist.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("starting informer");
        loop {
            match self.list_and_watch(&shutdown).await {
                Ok(()) => break,
                Err(e) => warn!(error = %e, "list/watch failed, relisting"),
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.relist_backoff) => {}
            }
        }
        info!("informer stopped");
    }

    /// Returns `Ok` only on shutdown.
    async fn list_and_watch(&self, shutdown: &CancellationToken) -> Result<()> {
        let list = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            list = self.source.list() => list?,
        };
        let mut version = list.resource_version;
        let keys: Vec<Key> = list.items.iter().filter_map(|obj| obj.key().ok()).collect();
        self.store.replace(list.items);
        debug!(count = keys.len(), resource_version = %version, "listed objects");
        for key in keys {
            self.queue.add(key);
        }

        loop {
            let mut stream = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                stream = self.source.watch(&version) => stream?,
            };
            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    next = stream.next() => next,
                };
                let Some(event) = next else {
                    break;
                };
                let event = event?;
                if let Some(v) = event.object().resource_version() {
                    version = v.to_string();
                }
                self.observe(&event);
            }
            debug!(resource_version = %version, "watch closed by server, resuming");
        }
    }

    fn observe(&self, event: &WatchEvent<T>) {
        metrics::watch_events().add(1, &[KeyValue::new("type", event.kind())]);
        match self.store.apply(event) {
            // A deleted object cannot be reconciled.
            Ok(_) if matches!(event, WatchEvent::Deleted(_)) => {}
            Ok(key) => self.queue.add(key),
            Err(e) => error!(error = %e, "unknown object, dropping event"),
        }
    }
}
