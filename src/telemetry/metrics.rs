//! Metric instrument factories.
//!
//! Instruments come from the `"podwatch"` meter on the global
//! `MeterProvider`; without an OTLP endpoint they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("podwatch")
}

/// Counter: keys newly marked for processing.
/// Labels: `queue`.
pub fn queue_adds() -> Counter<u64> {
    meter()
        .u64_counter("podwatch.queue.adds")
        .with_description("Keys added to the work queue")
        .build()
}

/// Counter: rate-limited re-adds after a failure.
/// Labels: `queue`.
pub fn queue_retries() -> Counter<u64> {
    meter()
        .u64_counter("podwatch.queue.retries")
        .with_description("Keys scheduled for retry with backoff")
        .build()
}

/// Counter: watch events seen by the informer.
/// Labels: `type` ("added" | "modified" | "deleted").
pub fn watch_events() -> Counter<u64> {
    meter()
        .u64_counter("podwatch.watch.events")
        .with_description("Watch events received")
        .build()
}

/// Counter: finished reconciliations.
/// Labels: `outcome` ("success" | "retry" | "give_up").
pub fn reconcile_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("podwatch.reconcile.outcomes")
        .with_description("Reconciliation results")
        .build()
}

/// Histogram: reconciliation duration in milliseconds.
pub fn reconcile_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("podwatch.reconcile.duration_ms")
        .with_description("Reconciliation duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: events handed to a notification backend.
/// Labels: `handler`, `result` ("ok" | "error").
pub fn events_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("podwatch.events.dispatched")
        .with_description("Crash events dispatched to a handler")
        .build()
}
