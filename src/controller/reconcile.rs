//! One reconciliation pass per dequeued key.

use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, error, warn};

use super::Controller;
use crate::error::{Error, Result};
use crate::handlers::Event;
use crate::model::Key;
use crate::telemetry::metrics;
use crate::telemetry::reconcile::{record_outcome, start_reconcile_span};

impl Controller {
    /// Take one key, reconcile it and settle its retry state.
    ///
    /// Returns `false` once the queue is shut down and drained.
    pub async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let span = start_reconcile_span(&key);
        let started = Instant::now();
        let result = self.process_item(&key).instrument(span.clone()).await;
        self.queue.done(&key);

        let outcome = match result {
            Ok(()) => {
                self.queue.forget(&key);
                "success"
            }
            Err(e) if self.queue.num_requeues(&key) < self.config.max_retries => {
                span.in_scope(|| warn!(key = %key, error = %e, "error processing (will retry)"));
                self.queue.add_rate_limited(key.clone());
                "retry"
            }
            Err(e) => {
                span.in_scope(|| error!(key = %key, error = %e, "error processing (giving up)"));
                self.queue.forget(&key);
                "give_up"
            }
        };

        record_outcome(&span, outcome);
        metrics::reconcile_outcomes().add(1, &[KeyValue::new("outcome", outcome)]);
        metrics::reconcile_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        true
    }

    /// Check the current state of `key` and notify if a container is stuck
    /// in one of the trigger reasons.
    ///
    /// A key whose object is gone is not an error.
    pub async fn process_item(&self, key: &Key) -> Result<()> {
        let Some(pod) = self.store.get_by_key(key)? else {
            debug!(key = %key, "object no longer exists");
            return Ok(());
        };
        let Some(status) = pod.waiting_container(self.config.trigger_reasons.as_slice()) else {
            return Ok(());
        };
        let waiting = status.state.waiting.clone().unwrap_or_default();

        let raw_log = self
            .logs
            .tail_logs(
                &pod.metadata.namespace,
                &pod.metadata.name,
                &status.name,
                self.config.tail_lines,
            )
            .await
            .map_err(|e| Error::Diagnostics {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        error!(container = %status.name, key = %key, reason = %waiting.reason, "container crashed");
        let event = Event {
            namespace: pod.metadata.namespace.clone(),
            name: pod.metadata.name.clone(),
            container: status.name.clone(),
            reason: waiting.reason,
            message: waiting.message,
            logs: raw_log.lines().map(str::to_string).collect(),
            detected_at: Utc::now(),
        };

        let handler = self.handler.name();
        let result = self.handler.handle(event).await;
        let label = if result.is_ok() { "ok" } else { "error" };
        metrics::events_dispatched().add(
            1,
            &[
                KeyValue::new("handler", handler),
                KeyValue::new("result", label),
            ],
        );
        result
    }
}
