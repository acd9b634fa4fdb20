//! Client-facing event serialization.
//!
//! Converts [`PersistentEvent`] records into the JSON representation an
//! application service expects. All events of one push share a single
//! `time_now_ms` reference point for their `unsigned.age` field.

use serde_json::{json, Map, Value};

use courier_core::event::{
    PersistentEvent, EVENT_TYPE_MEMBER, MEMBERSHIP_INVITE, MEMBERSHIP_KNOCK,
};
use courier_core::service::ApplicationService;

/// Serialize a batch of events for delivery to `service`.
///
/// `time_now_ms` is sampled once by the caller so every event in the
/// batch reports a consistent age.
pub fn serialize_events(
    service: &ApplicationService,
    events: &[PersistentEvent],
    time_now_ms: i64,
) -> Vec<Value> {
    events
        .iter()
        .map(|event| serialize_event(service, event, time_now_ms))
        .collect()
}

fn serialize_event(
    service: &ApplicationService,
    event: &PersistentEvent,
    time_now_ms: i64,
) -> Value {
    let mut unsigned = Map::new();
    unsigned.insert(
        "age".to_string(),
        json!(time_now_ms - event.origin_server_ts),
    );

    // Invite/knock membership events for users the service is interested
    // in carry the pre-stripped room state so the service can render the
    // room without a round trip.
    if let Some(field) = stripped_state_field(service, event) {
        if let Some(stripped) = &event.stripped_state {
            unsigned.insert(field.to_string(), json!(stripped));
        }
    }

    let mut serialized = Map::new();
    serialized.insert("event_id".to_string(), json!(event.event_id));
    serialized.insert("type".to_string(), json!(event.kind));
    serialized.insert("sender".to_string(), json!(event.sender));
    serialized.insert("room_id".to_string(), json!(event.room_id));
    serialized.insert(
        "origin_server_ts".to_string(),
        json!(event.origin_server_ts),
    );
    if let Some(state_key) = &event.state_key {
        serialized.insert("state_key".to_string(), json!(state_key));
    }
    serialized.insert("content".to_string(), event.content.clone());
    serialized.insert("unsigned".to_string(), Value::Object(unsigned));

    Value::Object(serialized)
}

/// Unsigned-field name under which stripped state is attached, or `None`
/// when the event does not qualify for enrichment.
fn stripped_state_field(
    service: &ApplicationService,
    event: &PersistentEvent,
) -> Option<&'static str> {
    if event.kind != EVENT_TYPE_MEMBER {
        return None;
    }
    let field = match event.membership()? {
        MEMBERSHIP_INVITE => "invite_room_state",
        MEMBERSHIP_KNOCK => "knock_room_state",
        _ => return None,
    };
    let subject = event.state_key.as_deref()?;
    service.is_interested_in_user(subject).then_some(field)
}
