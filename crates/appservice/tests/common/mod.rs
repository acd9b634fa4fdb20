//! Shared test harness: a scripted in-memory transport, a counting
//! metrics sink, and service fixtures.
//!
//! Each test binary compiles its own copy and uses a different subset.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use courier_appservice::api::AppServiceClient;
use courier_appservice::transport::{JsonTransport, TransportError};
use courier_core::metrics::MetricsSink;
use courier_core::service::ApplicationService;

/// One request the client sent through the mock transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub hs_token: String,
    pub body: Option<Value>,
}

/// [`JsonTransport`] that replays scripted responses in order and
/// records every request it sees.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response to hand out.
    pub fn enqueue(&self, response: Result<Value, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Queue an HTTP status error.
    pub fn enqueue_status(&self, code: u16) {
        self.enqueue(Err(TransportError::Status {
            code,
            body: String::new(),
        }));
    }

    /// Everything the client has sent so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: RecordedRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock transport received more requests than were scripted")
    }
}

#[async_trait]
impl JsonTransport for MockTransport {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        hs_token: &str,
    ) -> Result<Value, TransportError> {
        self.record(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            query: query.to_vec(),
            hs_token: hs_token.to_string(),
            body: None,
        })
    }

    async fn put_json(
        &self,
        url: &str,
        hs_token: &str,
        body: &Value,
    ) -> Result<Value, TransportError> {
        self.record(RecordedRequest {
            method: "PUT",
            url: url.to_string(),
            query: Vec::new(),
            hs_token: hs_token.to_string(),
            body: Some(body.clone()),
        })
    }

    async fn post_json(
        &self,
        url: &str,
        hs_token: &str,
        body: &Value,
    ) -> Result<Value, TransportError> {
        self.record(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            query: Vec::new(),
            hs_token: hs_token.to_string(),
            body: Some(body.clone()),
        })
    }
}

/// [`MetricsSink`] that tallies increments per (counter, service) pair.
#[derive(Default)]
pub struct CountingMetricsSink {
    counts: Mutex<HashMap<(String, String), u64>>,
}

impl CountingMetricsSink {
    pub fn get(&self, name: &str, service_id: &str) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(&(name.to_string(), service_id.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl MetricsSink for CountingMetricsSink {
    fn increment(&self, name: &'static str, service_id: &str, delta: u64) {
        *self
            .counts
            .lock()
            .unwrap()
            .entry((name.to_string(), service_id.to_string()))
            .or_insert(0) += delta;
    }
}

/// A service with a push URL, credential, and both capability flags off.
pub fn push_service(id: &str) -> ApplicationService {
    ApplicationService::new(
        id,
        Some("http://as.example.com".to_string()),
        Some("hs_token_secret".to_string()),
    )
}

/// A push-disabled service (no URL, no token).
pub fn pushless_service(id: &str) -> ApplicationService {
    ApplicationService::new(id, None, None)
}

/// Fresh client wired to a mock transport and counting sink, with
/// handles kept for assertions.
pub fn setup() -> (Arc<MockTransport>, Arc<CountingMetricsSink>, AppServiceClient) {
    let transport = Arc::new(MockTransport::new());
    let metrics = Arc::new(CountingMetricsSink::default());
    let client = AppServiceClient::new(transport.clone(), metrics.clone());
    (transport, metrics, client)
}
