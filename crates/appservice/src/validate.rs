//! Shape validation for untrusted remote payloads.
//!
//! Application services return arbitrary JSON; nothing about field
//! presence or type may be assumed before an explicit check. These
//! predicates are pure and total -- callers drop anything that fails
//! and log a warning with the offending payload.

use serde_json::Value;

/// True iff `value` carries an `instances` field whose value is a list.
///
/// Element shape is not checked at this layer.
pub fn is_valid_protocol_metadata(value: &Value) -> bool {
    value.get("instances").map_or(false, Value::is_array)
}

/// True iff `value` is an object with string-valued `required_field` and
/// `protocol` fields and an object-valued `fields` field.
///
/// `required_field` is `"userid"` for user-kind queries and `"alias"`
/// for location-kind queries.
pub fn is_valid_3pe_result(value: &Value, required_field: &str) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    for key in [required_field, "protocol"] {
        if !object.get(key).map_or(false, Value::is_string) {
            return false;
        }
    }

    object.get("fields").map_or(false, Value::is_object)
}
