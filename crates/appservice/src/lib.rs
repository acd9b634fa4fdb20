//! Outbound delivery client for application services.
//!
//! This crate implements the homeserver side of the application-service
//! push API: existence queries, third-party entity and protocol-metadata
//! lookups, liveness pings, one-time key claims, and at-least-once
//! transaction delivery.
//!
//! - [`AppServiceClient`] — the orchestration layer; one method per
//!   operation, each with its own documented failure-tolerance policy.
//! - [`ResponseCache`] — single-flight TTL memoization used to coalesce
//!   concurrent protocol-metadata lookups.
//! - [`transport`] — the "send JSON, get JSON" seam ([`JsonTransport`])
//!   plus a pooled reqwest implementation ([`HttpJsonTransport`]).
//! - [`serialize`] — conversion of persistent event records into their
//!   client-facing wire representation.
//! - [`validate`] — shape checks applied to untrusted remote payloads
//!   before they are trusted.

pub mod api;
pub mod cache;
pub mod serialize;
pub mod transport;
pub mod validate;

pub use api::{AppServiceClient, ThirdPartyEntityKind};
pub use cache::ResponseCache;
pub use transport::{HttpJsonTransport, JsonTransport, TransportError};
