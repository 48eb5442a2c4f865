//! Reconciliation span helpers.

use tracing::Span;

use crate::model::Key;

/// Span wrapping one reconciliation of `key`.
///
/// `reconcile.outcome` starts empty and is filled by [`record_outcome`].
pub fn start_reconcile_span(key: &Key) -> Span {
    tracing::info_span!(
        "reconcile",
        "reconcile.key" = %key,
        "reconcile.outcome" = tracing::field::Empty,
    )
}

pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("reconcile.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(outcome, "reconcile finished");
    });
}
