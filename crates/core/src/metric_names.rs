//! Well-known counter name constants for application-service delivery.
//!
//! These are the canonical names passed to the host-provided
//! [`MetricsSink`](crate::metrics::MetricsSink), always labeled with the
//! application service ID.

/// Number of transaction pushes accepted by an application service.
pub const METRIC_SENT_TRANSACTIONS: &str = "appservice_sent_transactions";

/// Number of transaction pushes that failed to deliver.
pub const METRIC_FAILED_TRANSACTIONS: &str = "appservice_failed_transactions";

/// Number of persistent events delivered inside accepted transactions.
pub const METRIC_SENT_EVENTS: &str = "appservice_sent_events";

/// Number of ephemeral events delivered inside accepted transactions.
pub const METRIC_SENT_EPHEMERAL: &str = "appservice_sent_ephemeral";

/// Number of to-device messages delivered inside accepted transactions.
pub const METRIC_SENT_TO_DEVICE: &str = "appservice_sent_to_device";
