//! Counter emission capability.
//!
//! Delivery counters are process-wide observability state owned by the
//! host application, not by this workspace. The client is handed a
//! [`MetricsSink`] at construction and calls it fire-and-forget; hosts
//! wire it to whatever metrics backend they run.

/// Fire-and-forget monotonic counter sink.
///
/// Implementations must be cheap and non-blocking: the client calls
/// `increment` on hot delivery paths and never inspects the outcome.
pub trait MetricsSink: Send + Sync {
    /// Add `delta` to the counter `name`, labeled by application service ID.
    fn increment(&self, name: &'static str, service_id: &str, delta: u64);
}

/// A sink that discards every increment.
///
/// Useful for hosts that do not collect metrics, and for tests that do
/// not assert on counters.
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _name: &'static str, _service_id: &str, _delta: u64) {}
}
