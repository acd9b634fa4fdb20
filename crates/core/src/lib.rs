//! Courier domain types.
//!
//! This crate holds the I/O-free building blocks shared across the
//! workspace:
//!
//! - [`ApplicationService`] — an externally-registered service record
//!   (push URL, credential, capability flags, interest namespaces).
//! - [`event`] — immutable event records and the key/device payload
//!   types carried inside a transaction.
//! - [`MetricsSink`] — the fire-and-forget counter capability injected
//!   into the client by the host application.
//! - [`metric_names`] — well-known counter name constants.

pub mod event;
pub mod metric_names;
pub mod metrics;
pub mod service;

pub use event::{
    DeviceListUpdates, KeyClaim, OneTimeKeyCounts, PersistentEvent, ThirdPartyInstanceId,
    UnusedFallbackKeys,
};
pub use metrics::{MetricsSink, NoopMetricsSink};
pub use service::ApplicationService;
