//! The application-service client.
//!
//! [`AppServiceClient`] manages homeserver -> application-service
//! communication: existence queries, third-party lookups, liveness
//! pings, one-time key claims, and transaction pushes. Every operation
//! fails closed to its documented default -- a transport or validation
//! error degrades to `false`/empty/`None` with a warning log -- except
//! [`ping`](AppServiceClient::ping), whose whole purpose is to report
//! failure to the caller.
//!
//! Operations on different services interleave freely; this layer takes
//! no per-service lock, so callers that need transaction ordering must
//! sequence their own pushes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Map, Value};
use tokio::time::Duration;

use courier_core::event::{
    DeviceListUpdates, KeyClaim, OneTimeKeyCounts, PersistentEvent, ThirdPartyInstanceId,
    UnusedFallbackKeys,
};
use courier_core::metric_names::{
    METRIC_FAILED_TRANSACTIONS, METRIC_SENT_EPHEMERAL, METRIC_SENT_EVENTS,
    METRIC_SENT_TO_DEVICE, METRIC_SENT_TRANSACTIONS,
};
use courier_core::metrics::MetricsSink;
use courier_core::service::ApplicationService;

use crate::cache::ResponseCache;
use crate::serialize::serialize_events;
use crate::transport::{JsonTransport, TransportError};
use crate::validate::{is_valid_3pe_result, is_valid_protocol_metadata};

/// Path prefix of the unstable application-service API.
const APP_SERVICE_PREFIX: &str = "/_matrix/app/unstable";

/// How long third-party protocol metadata stays cached.
const PROTOCOL_META_TTL: Duration = Duration::from_secs(60 * 60);

/// Escape set for URL path segments: everything except unreserved
/// characters and `/`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Which kind of third-party entity a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThirdPartyEntityKind {
    /// A bridged user on the remote network.
    User,
    /// A bridged room/channel on the remote network.
    Location,
}

impl ThirdPartyEntityKind {
    fn path_segment(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Location => "location",
        }
    }

    /// Field a result object must carry to be considered well-formed.
    fn required_field(self) -> &'static str {
        match self {
            Self::User => "userid",
            Self::Location => "alias",
        }
    }
}

/// Homeserver-side client for the application-service push API.
pub struct AppServiceClient {
    transport: Arc<dyn JsonTransport>,
    metrics: Arc<dyn MetricsSink>,
    protocol_meta_cache: ResponseCache<(String, String), Option<Value>>,
}

impl AppServiceClient {
    /// Build a client over the given transport and metrics capabilities.
    pub fn new(transport: Arc<dyn JsonTransport>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            transport,
            metrics,
            protocol_meta_cache: ResponseCache::new("as_protocol_meta", PROTOCOL_META_TTL),
        }
    }

    /// Ask the service whether it knows `user_id`.
    ///
    /// Returns `false` for push-disabled services, on HTTP 404 (a
    /// well-formed negative answer), on a 2xx response with a JSON
    /// `null` or empty body, and on any other error (with a warning
    /// log). Only a successful non-null response means `true`.
    pub async fn query_user_exists(
        &self,
        service: &ApplicationService,
        user_id: &str,
    ) -> bool {
        let Some(url) = service.url() else {
            return false;
        };
        let uri = format!("{}/users/{}", url, utf8_percent_encode(user_id, PATH_SEGMENT));
        self.query_exists(service, &uri, "user existence query").await
    }

    /// Ask the service whether it knows the room alias `alias`.
    ///
    /// Same result mapping as [`query_user_exists`](Self::query_user_exists).
    pub async fn query_alias_exists(
        &self,
        service: &ApplicationService,
        alias: &str,
    ) -> bool {
        let Some(url) = service.url() else {
            return false;
        };
        let uri = format!("{}/rooms/{}", url, utf8_percent_encode(alias, PATH_SEGMENT));
        self.query_exists(service, &uri, "alias existence query").await
    }

    /// Search the service for third-party users or locations.
    ///
    /// `fields` are protocol-specific filter parameters passed through as
    /// query parameters. Responses that are not a list degrade to an
    /// empty result; malformed list entries are dropped individually.
    pub async fn query_3pe(
        &self,
        service: &ApplicationService,
        kind: ThirdPartyEntityKind,
        protocol: &str,
        fields: &[(String, String)],
    ) -> Vec<Value> {
        let Some(url) = service.url() else {
            return Vec::new();
        };
        let uri = format!(
            "{}{}/thirdparty/{}/{}",
            url,
            APP_SERVICE_PREFIX,
            kind.path_segment(),
            utf8_percent_encode(protocol, PATH_SEGMENT),
        );

        let response = match self.transport.get_json(&uri, fields, service.hs_token()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "third-party entity query failed");
                return Vec::new();
            }
        };

        let items = match response {
            Value::Array(items) => items,
            other => {
                tracing::warn!(uri = %uri, payload = %other, "third-party entity query returned a non-list response");
                return Vec::new();
            }
        };

        items
            .into_iter()
            .filter(|item| {
                if is_valid_3pe_result(item, kind.required_field()) {
                    true
                } else {
                    tracing::warn!(uri = %uri, payload = %item, "dropping malformed third-party entity result");
                    false
                }
            })
            .collect()
    }

    /// Fetch metadata for a bridged protocol, memoized for one hour per
    /// `(service, protocol)` key.
    ///
    /// Returns `Some({})` immediately (no network call) for push-disabled
    /// services, and `None` on transport or validation failure. Each
    /// instance in the result with a non-null `network_id` gains an
    /// `instance_id` combining the service ID and the network ID.
    pub async fn get_3pe_protocol(
        &self,
        service: &ApplicationService,
        protocol: &str,
    ) -> Option<Value> {
        let Some(url) = service.url() else {
            return Some(Value::Object(Map::new()));
        };

        let uri = format!(
            "{}{}/thirdparty/protocol/{}",
            url,
            APP_SERVICE_PREFIX,
            utf8_percent_encode(protocol, PATH_SEGMENT),
        );
        let service_id = service.id().to_string();
        let hs_token = service.hs_token().to_string();
        let transport = Arc::clone(&self.transport);

        let key = (service_id.clone(), protocol.to_string());
        self.protocol_meta_cache
            .wrap(key, async move {
                fetch_protocol_metadata(transport, uri, hs_token, service_id).await
            })
            .await
    }

    /// Liveness-check the service.
    ///
    /// The only operation that propagates errors: callers drive their
    /// liveness logic off the failure itself.
    ///
    /// # Panics
    ///
    /// Panics when called on a push-disabled service; callers must check
    /// the URL first.
    pub async fn ping(
        &self,
        service: &ApplicationService,
        txn_id: Option<&str>,
    ) -> Result<(), TransportError> {
        let url = service
            .url()
            .expect("ping called on a push-disabled application service");

        let uri = format!("{}{}/msc2659/ping", url, APP_SERVICE_PREFIX);
        let body = json!({ "transaction_id": txn_id });
        self.transport
            .post_json(&uri, service.hs_token(), &body)
            .await
            .map(|_| ())
    }

    /// Push one transaction of events and optional payloads.
    ///
    /// Returns `true` when the service accepted the delivery (trivially
    /// so for push-disabled services) and `false` on any failure, with
    /// the corresponding counters incremented either way. Payloads the
    /// service has not opted into are omitted from the body entirely.
    ///
    /// A missing `txn_id` defaults to `0` with a warning. This preserves
    /// a weak invariant: colliding IDs across restarts defeat
    /// receiver-side deduplication, so callers should always supply one.
    #[allow(clippy::too_many_arguments)]
    pub async fn push_transaction(
        &self,
        service: &ApplicationService,
        events: &[PersistentEvent],
        ephemeral: &[Value],
        to_device_messages: &[Value],
        one_time_key_counts: &OneTimeKeyCounts,
        unused_fallback_keys: &UnusedFallbackKeys,
        device_list_summary: &DeviceListUpdates,
        txn_id: Option<i64>,
    ) -> bool {
        let Some(url) = service.url() else {
            return true;
        };

        let txn_id = match txn_id {
            Some(txn_id) => txn_id,
            None => {
                tracing::warn!(url, "missing transaction ID for event push, defaulting to 0");
                0
            }
        };

        let serialized = serialize_events(service, events, Utc::now().timestamp_millis());
        let event_count = serialized.len() as u64;

        let mut body = Map::new();
        body.insert("events".to_string(), Value::Array(serialized));

        // Never send ephemeral payloads to services that did not opt in.
        if service.supports_ephemeral() {
            body.insert("de.sorunome.msc2409.ephemeral".to_string(), json!(ephemeral));
            body.insert(
                "de.sorunome.msc2409.to_device".to_string(),
                json!(to_device_messages),
            );
        }

        if service.supports_transaction_extensions() {
            if !one_time_key_counts.is_empty() {
                body.insert(
                    "org.matrix.msc3202.device_one_time_key_counts".to_string(),
                    json!(one_time_key_counts),
                );
                // Duplicated under the older field name for services that
                // still read it.
                body.insert(
                    "org.matrix.msc3202.device_one_time_keys_count".to_string(),
                    json!(one_time_key_counts),
                );
            }
            if !unused_fallback_keys.is_empty() {
                body.insert(
                    "org.matrix.msc3202.device_unused_fallback_key_types".to_string(),
                    json!(unused_fallback_keys),
                );
            }
            if !device_list_summary.is_empty() {
                body.insert(
                    "org.matrix.msc3202.device_lists".to_string(),
                    json!({
                        "changed": device_list_summary.changed,
                        "left": device_list_summary.left,
                    }),
                );
            }
        }

        let uri = format!("{}/transactions/{}", url, txn_id);
        match self
            .transport
            .put_json(&uri, service.hs_token(), &Value::Object(body))
            .await
        {
            Ok(_) => {
                tracing::debug!(
                    uri = %uri,
                    events = ?events.iter().map(|e| e.event_id.as_str()).collect::<Vec<_>>(),
                    "transaction push succeeded"
                );
                self.metrics.increment(METRIC_SENT_TRANSACTIONS, service.id(), 1);
                self.metrics.increment(METRIC_SENT_EVENTS, service.id(), event_count);
                self.metrics
                    .increment(METRIC_SENT_EPHEMERAL, service.id(), ephemeral.len() as u64);
                self.metrics.increment(
                    METRIC_SENT_TO_DEVICE,
                    service.id(),
                    to_device_messages.len() as u64,
                );
                true
            }
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "transaction push failed");
                self.metrics
                    .increment(METRIC_FAILED_TRANSACTIONS, service.id(), 1);
                false
            }
        }
    }

    /// Claim one-time keys from the service.
    ///
    /// Returns the raw response mapping plus the claims it did not
    /// fulfil, verbatim, so the caller can retry them elsewhere. A
    /// push-disabled service, a 404/405 (endpoint unsupported), or any
    /// transport error all yield `({}, full original query)`.
    pub async fn claim_one_time_keys(
        &self,
        service: &ApplicationService,
        query: &[KeyClaim],
    ) -> (Value, Vec<KeyClaim>) {
        let unfulfilled = || (Value::Object(Map::new()), query.to_vec());

        let Some(url) = service.url() else {
            return unfulfilled();
        };

        // Group the requested triples into user -> device -> [algorithms].
        let mut body: BTreeMap<&str, BTreeMap<&str, Vec<&str>>> = BTreeMap::new();
        for claim in query {
            body.entry(&claim.user_id)
                .or_default()
                .entry(&claim.device_id)
                .or_default()
                .push(&claim.algorithm);
        }

        let uri = format!("{}{}/msc3983/keys/claim", url, APP_SERVICE_PREFIX);
        let response = match self
            .transport
            .post_json(&uri, service.hs_token(), &json!(body))
            .await
        {
            Ok(response) => response,
            // The service does not implement key claims at all.
            Err(e) if matches!(e.status_code(), Some(404 | 405)) => return unfulfilled(),
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "one-time key claim failed");
                return unfulfilled();
            }
        };

        let missing = query
            .iter()
            .filter(|claim| !claim_fulfilled(&response, claim))
            .cloned()
            .collect();

        (response, missing)
    }

    /// Shared 2xx/404/error mapping for the two existence queries.
    async fn query_exists(
        &self,
        service: &ApplicationService,
        uri: &str,
        what: &'static str,
    ) -> bool {
        match self.transport.get_json(uri, &[], service.hs_token()).await {
            // A JSON `null` (or empty) body is a well-formed negative
            // answer, not an error.
            Ok(Value::Null) => false,
            // Any other 2xx body, even an empty object, signals existence.
            Ok(_) => true,
            Err(e) if e.status_code() == Some(404) => false,
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "{} failed", what);
                false
            }
        }
    }
}

/// A claim is fulfilled iff the response maps the exact algorithm string
/// under `response[user][device]`.
fn claim_fulfilled(response: &Value, claim: &KeyClaim) -> bool {
    response
        .get(&claim.user_id)
        .and_then(|user| user.get(&claim.device_id))
        .and_then(Value::as_object)
        .map_or(false, |keys| keys.contains_key(&claim.algorithm))
}

/// Cache producer for [`AppServiceClient::get_3pe_protocol`]: fetch,
/// validate, and enrich instances with their derived `instance_id`.
async fn fetch_protocol_metadata(
    transport: Arc<dyn JsonTransport>,
    uri: String,
    hs_token: String,
    service_id: String,
) -> Option<Value> {
    let mut info = match transport.get_json(&uri, &[], &hs_token).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(uri = %uri, error = %e, "third-party protocol query failed");
            return None;
        }
    };

    if !is_valid_protocol_metadata(&info) {
        tracing::warn!(uri = %uri, payload = %info, "third-party protocol query returned an invalid result");
        return None;
    }

    if let Some(instances) = info.get_mut("instances").and_then(Value::as_array_mut) {
        for instance in instances {
            // Any non-null network_id qualifies; strings render bare,
            // everything else as its JSON text.
            let network_id = match instance.get("network_id") {
                None | Some(Value::Null) => continue,
                Some(Value::String(network_id)) => network_id.clone(),
                Some(other) => other.to_string(),
            };
            let instance_id = ThirdPartyInstanceId::new(service_id.clone(), network_id);
            if let Some(fields) = instance.as_object_mut() {
                fields.insert(
                    "instance_id".to_string(),
                    Value::String(instance_id.to_string()),
                );
            }
        }
    }

    Some(info)
}
