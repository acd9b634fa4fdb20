//! Event records and transaction payload types.
//!
//! [`PersistentEvent`] is the immutable, pre-built record handed to the
//! delivery layer by the event pipeline; this crate never constructs
//! events itself. The remaining types describe the optional payloads a
//! transaction can carry (device-list summaries, key counts, key claims).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Event type of room membership changes.
pub const EVENT_TYPE_MEMBER: &str = "m.room.member";

/// Membership value for invitations.
pub const MEMBERSHIP_INVITE: &str = "invite";

/// Membership value for knocks.
pub const MEMBERSHIP_KNOCK: &str = "knock";

/// An immutable persistent event, pre-built by the event pipeline.
#[derive(Debug, Clone)]
pub struct PersistentEvent {
    /// Globally unique event ID.
    pub event_id: String,
    /// Event type string, e.g. `m.room.message` or `m.room.member`.
    pub kind: String,
    /// Full user ID of the sender.
    pub sender: String,
    /// Room the event belongs to.
    pub room_id: String,
    /// Origin server timestamp in milliseconds.
    pub origin_server_ts: i64,
    /// State key for state events (the subject user for membership events).
    pub state_key: Option<String>,
    /// Event content as sent by the origin.
    pub content: Value,
    /// Stripped room state prepared by the caller, attached during
    /// serialization only for invite/knock membership events the target
    /// service is interested in.
    pub stripped_state: Option<Vec<Value>>,
}

impl PersistentEvent {
    /// Membership value of a membership event, if present.
    pub fn membership(&self) -> Option<&str> {
        self.content.get("membership").and_then(Value::as_str)
    }
}

/// Per-user, per-device count of remaining one-time keys by algorithm.
pub type OneTimeKeyCounts = BTreeMap<String, BTreeMap<String, BTreeMap<String, i64>>>;

/// Per-user, per-device list of unused fallback key algorithms.
pub type UnusedFallbackKeys = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Summary of device-list changes carried alongside a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceListUpdates {
    /// Users whose device lists changed.
    pub changed: BTreeSet<String>,
    /// Users who left all shared rooms.
    pub left: BTreeSet<String>,
}

impl DeviceListUpdates {
    /// True when the summary carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.left.is_empty()
    }
}

/// One requested (user, device, algorithm) key claim.
///
/// Claims that a service does not fulfil are returned verbatim so the
/// caller can retry them through another path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyClaim {
    /// Full user ID owning the device.
    pub user_id: String,
    /// Device the key is claimed for.
    pub device_id: String,
    /// Requested key algorithm, e.g. `signed_curve25519`.
    pub algorithm: String,
}

impl KeyClaim {
    /// Build a claim from its three parts.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        algorithm: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            algorithm: algorithm.into(),
        }
    }
}

/// Identifier of one bridged network instance behind an application
/// service, rendered as `{appservice_id}|{network_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThirdPartyInstanceId {
    /// Registration ID of the owning application service.
    pub appservice_id: String,
    /// Service-scoped network identifier.
    pub network_id: String,
}

impl ThirdPartyInstanceId {
    /// Build an instance ID from its two parts.
    pub fn new(appservice_id: impl Into<String>, network_id: impl Into<String>) -> Self {
        Self {
            appservice_id: appservice_id.into(),
            network_id: network_id.into(),
        }
    }
}

impl fmt::Display for ThirdPartyInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.appservice_id, self.network_id)
    }
}
