//! The "send JSON, get JSON" transport seam.
//!
//! [`JsonTransport`] is the only capability the client needs from the
//! HTTP layer. Expected negative outcomes (404 on existence checks,
//! 404/405 on unsupported endpoints) surface as
//! [`TransportError::Status`] values that callers pattern-match, never
//! as a generic caught exception. [`HttpJsonTransport`] is the
//! production implementation over a pooled [`reqwest::Client`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Default per-request timeout for the reqwest implementation.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Error type for a single transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never completed (connection, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The remote returned a non-2xx status code.
    #[error("unexpected HTTP status {code}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Raw response body for diagnostics.
        body: String,
    },

    /// A 2xx response body that was not valid JSON.
    #[error("response body was not valid JSON: {0}")]
    MalformedJson(String),
}

impl TransportError {
    /// HTTP status code of a [`TransportError::Status`], if that is what
    /// this error is.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Minimal JSON-over-HTTP capability consumed by the client.
///
/// Every call authenticates with `Bearer {hs_token}`; `get_json` and
/// `put_json` additionally duplicate the token as an `access_token`
/// query parameter for services that predate the header.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    /// GET `url` with the given query parameters.
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        hs_token: &str,
    ) -> Result<Value, TransportError>;

    /// PUT `body` to `url`.
    async fn put_json(
        &self,
        url: &str,
        hs_token: &str,
        body: &Value,
    ) -> Result<Value, TransportError>;

    /// POST `body` to `url`.
    async fn post_json(
        &self,
        url: &str,
        hs_token: &str,
        body: &Value,
    ) -> Result<Value, TransportError>;
}

/// [`JsonTransport`] backed by a pooled [`reqwest::Client`].
pub struct HttpJsonTransport {
    client: reqwest::Client,
}

impl HttpJsonTransport {
    /// Create a transport with the default request timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client }
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Send the request and decode the body.
    ///
    /// An empty 2xx body decodes as `Value::Null` rather than an
    /// error; callers decide per operation what a null body means.
    async fn execute(request: reqwest::RequestBuilder) -> Result<Value, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| TransportError::MalformedJson(e.to_string()))
    }
}

impl Default for HttpJsonTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JsonTransport for HttpJsonTransport {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        hs_token: &str,
    ) -> Result<Value, TransportError> {
        let request = self
            .client
            .get(url)
            .bearer_auth(hs_token)
            .query(query)
            .query(&[("access_token", hs_token)]);
        Self::execute(request).await
    }

    async fn put_json(
        &self,
        url: &str,
        hs_token: &str,
        body: &Value,
    ) -> Result<Value, TransportError> {
        let request = self
            .client
            .put(url)
            .bearer_auth(hs_token)
            .query(&[("access_token", hs_token)])
            .json(body);
        Self::execute(request).await
    }

    async fn post_json(
        &self,
        url: &str,
        hs_token: &str,
        body: &Value,
    ) -> Result<Value, TransportError> {
        let request = self.client.post(url).bearer_auth(hs_token).json(body);
        Self::execute(request).await
    }
}
