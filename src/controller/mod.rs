//! Reconciler: pulls keys off the queue, checks the latest cached pod and
//! dispatches one event per detected crash loop.

mod reconcile;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::ObjectStore;
use crate::error::{Error, Result};
use crate::handlers::Handler;
use crate::model::{Key, Pod};
use crate::queue::RateLimitingQueue;

/// Side channel for fetching recent log output of one container.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn tail_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        lines: u32,
    ) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Independent worker loops sharing the queue.
    pub workers: usize,
    /// Retries after the first failed attempt before a key is dropped.
    pub max_retries: u32,
    /// Log lines captured per event.
    pub tail_lines: u32,
    /// Waiting reasons that count as a crash.
    pub trigger_reasons: Vec<String>,
    /// Give up on startup if the cache has not synced by then.
    pub sync_timeout: Duration,
    pub sync_poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_retries: 3,
            tail_lines: 20,
            trigger_reasons: vec!["CrashLoopBackOff".to_string()],
            sync_timeout: Duration::from_secs(60),
            sync_poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct Controller {
    queue: RateLimitingQueue<Key>,
    store: Arc<dyn ObjectStore<Pod>>,
    logs: Arc<dyn LogSource>,
    handler: Arc<dyn Handler>,
    config: Arc<ControllerConfig>,
}

impl Clone for Controller {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            store: Arc::clone(&self.store),
            logs: Arc::clone(&self.logs),
            handler: Arc::clone(&self.handler),
            config: Arc::clone(&self.config),
        }
    }
}

impl Controller {
    pub fn new(
        queue: RateLimitingQueue<Key>,
        store: Arc<dyn ObjectStore<Pod>>,
        logs: Arc<dyn LogSource>,
        handler: Arc<dyn Handler>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            logs,
            handler,
            config: Arc::new(config),
        }
    }

    pub fn queue(&self) -> &RateLimitingQueue<Key> {
        &self.queue
    }

    /// Wait for the cache, then process keys until `shutdown` fires and the
    /// queue drains.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheSync`] if the cache does not sync within the
    /// configured timeout or shutdown arrives first. The queue is shut down
    /// in that case and nothing is reconciled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(handler = self.handler.name(), "starting podwatch controller");

        if let Err(e) = self.wait_for_cache_sync(&shutdown).await {
            self.queue.shut_down();
            return Err(e);
        }
        info!("podwatch controller synced and ready");

        let queue = self.queue.clone();
        let stop = shutdown.clone();
        let watcher = tokio::spawn(async move {
            stop.cancelled().await;
            info!("podwatch controller is shutting down");
            queue.shut_down();
        });

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers.max(1) {
            let worker = self.clone();
            workers.spawn(async move { worker.run_worker(id).await });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task failed");
            }
        }
        watcher.abort();

        info!("podwatch controller stopped");
        Ok(())
    }

    async fn wait_for_cache_sync(&self, shutdown: &CancellationToken) -> Result<()> {
        let deadline = tokio::time::sleep(self.config.sync_timeout);
        tokio::pin!(deadline);
        loop {
            if self.store.has_synced() {
                return Ok(());
            }
            tokio::select! {
                _ = shutdown.cancelled() => return Err(Error::CacheSync),
                _ = &mut deadline => return Err(Error::CacheSync),
                _ = tokio::time::sleep(self.config.sync_poll_interval) => {}
            }
        }
    }

    async fn run_worker(&self, id: usize) {
        debug!(worker = id, "worker started");
        while self.process_next_item().await {}
        debug!(worker = id, "worker stopped");
    }
}
