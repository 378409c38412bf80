//! Metric instrument factories for stu-controller.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created from the `"stu-controller"` meter. Without a
//! configured provider the global meter is a no-op.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};

/// Returns the shared meter for stu-controller instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("stu-controller")
}

/// Counter: keys added to a work queue.
/// Labels: `queue`.
pub fn queue_adds() -> Counter<u64> {
    meter()
        .u64_counter("stu.queue.adds")
        .with_description("Number of keys added to the work queue")
        .build()
}

/// Counter: rate-limited re-adds.
/// Labels: `queue`.
pub fn queue_retries() -> Counter<u64> {
    meter()
        .u64_counter("stu.queue.retries")
        .with_description("Number of rate-limited requeues")
        .build()
}

/// Up/down counter: keys waiting to be dequeued.
/// Labels: `queue`.
pub fn queue_depth() -> UpDownCounter<i64> {
    meter()
        .i64_up_down_counter("stu.queue.depth")
        .with_description("Keys currently waiting in the work queue")
        .build()
}

/// Counter: reconcile outcomes.
/// Labels: `outcome` ("success" | "skip" | "retry").
pub fn reconcile_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("stu.reconcile.outcomes")
        .with_description("Number of reconcile runs by outcome")
        .build()
}

/// Histogram: reconcile duration in milliseconds.
pub fn reconcile_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("stu.reconcile.duration_ms")
        .with_description("Reconcile duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: errors reported to the process-wide error sink.
/// Labels: `context`.
pub fn errors_handled() -> Counter<u64> {
    meter()
        .u64_counter("stu.errors.handled")
        .with_description("Errors reported to the error sink")
        .build()
}

/// Counter: events recorded against resources.
/// Labels: `reason`.
pub fn events_recorded() -> Counter<u64> {
    meter()
        .u64_counter("stu.events.recorded")
        .with_description("Events recorded against watched resources")
        .build()
}

/// Instruments bound to one named queue, built once per queue.
pub struct QueueMetrics {
    labels: [KeyValue; 1],
    adds: Counter<u64>,
    retries: Counter<u64>,
    depth: UpDownCounter<i64>,
}

impl QueueMetrics {
    pub fn new(queue: &str) -> Self {
        Self {
            labels: [KeyValue::new("queue", queue.to_string())],
            adds: queue_adds(),
            retries: queue_retries(),
            depth: queue_depth(),
        }
    }

    pub fn add(&self) {
        self.adds.add(1, &self.labels);
        self.depth.add(1, &self.labels);
    }

    pub fn get(&self) {
        self.depth.add(-1, &self.labels);
    }

    pub fn retry(&self) {
        self.retries.add(1, &self.labels);
    }
}
