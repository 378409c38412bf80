//! Reconcile span helpers.
//!
//! Every reconcile runs inside a `reconcile` span carrying the queue and
//! key; the outcome is recorded on the span once known.

use tracing::Span;

use crate::model::ResourceKey;

/// Start a span for one reconcile of `key`.
///
/// The `reconcile.outcome` field is declared empty and filled in by
/// [`record_outcome`].
pub fn start_sync_span(queue: &str, key: &ResourceKey) -> Span {
    tracing::info_span!(
        "reconcile",
        "reconcile.queue" = queue,
        "reconcile.key" = %key,
        "reconcile.outcome" = tracing::field::Empty,
    )
}

/// Record how a reconcile ended on its span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("reconcile.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(outcome, "reconcile finished");
    });
}
