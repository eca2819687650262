//! Registry client: serialize, wait for admission, dispatch.
//!
//! Order of operations for [`RegistryClient::create_document`]:
//! 1. The document is serialized. A serialization failure returns before any
//!    permit is consumed.
//! 2. The caller waits on the shared [`AdmissionGate`].
//! 3. The request is spawned onto the runtime and a [`Submission`] handle is
//!    returned. The gate does not await or inspect the response; the caller
//!    may await the handle or drop it.

use crate::document::Document;
use crate::error::{ClientError, SubmitError, TransportError};
use crate::gate::{AdmissionGate, Permit, RateWindow, TimeUnit};
use crate::transport::{PreparedRequest, ReqwestTransport, Transport, TransportResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Document creation endpoint of the production registry.
pub const DEFAULT_ENDPOINT: &str = "https://ismp.crpt.ru/api/v3/lk/documents/create";

/// File-loadable client settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    /// Maximum submissions per window.
    pub capacity: usize,
    /// Window length in milliseconds.
    pub window_ms: u64,
    pub request_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            capacity: 10,
            window_ms: 1_000,
            request_timeout_ms: Some(30_000),
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ClientError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Builder for [`RegistryClient`]. Inputs are validated in [`build`](Self::build).
#[derive(Debug)]
pub struct RegistryClientBuilder {
    endpoint: String,
    capacity: usize,
    window: Duration,
    request_timeout: Option<Duration>,
    headers: Vec<(String, String)>,
    transport: Option<Arc<dyn Transport>>,
    gate: Option<AdmissionGate>,
}

impl RegistryClientBuilder {
    pub fn new() -> Self {
        Self::from_config(&ClientConfig::default())
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            capacity: config.capacity,
            window: Duration::from_millis(config.window_ms),
            request_timeout: config.request_timeout_ms.map(Duration::from_millis),
            headers: Vec::new(),
            transport: None,
            gate: None,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// At most `capacity` submissions per `window`.
    pub fn rate(mut self, capacity: usize, window: Duration) -> Self {
        self.capacity = capacity;
        self.window = window;
        self
    }

    /// At most `capacity` submissions per one `unit`.
    pub fn rate_per(self, unit: TimeUnit, capacity: usize) -> Self {
        self.rate(capacity, unit.as_duration())
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Extra header sent with every submission.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the HTTP transport. The request timeout is not applied to custom transports.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Share an existing gate instead of creating one. The configured rate is ignored.
    pub fn gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn build(self) -> Result<RegistryClient, ClientError> {
        let gate = match self.gate {
            Some(gate) => gate,
            None => AdmissionGate::new(RateWindow::new(self.capacity, self.window)?)?,
        };
        let endpoint = Url::parse(&self.endpoint)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::Header(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::Header(format!("{name}: {e}")))?;
            headers.insert(name, value);
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let mut http = ReqwestTransport::new(reqwest::Client::builder().build()?);
                if let Some(timeout) = self.request_timeout {
                    http = http.with_timeout(timeout);
                }
                Arc::new(http)
            }
        };

        Ok(RegistryClient { endpoint, headers, gate, transport })
    }
}

impl Default for RegistryClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate-limited client for the registry's document creation endpoint.
///
/// Clones share the same gate, so the limit holds across every handle.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    endpoint: Url,
    headers: HeaderMap,
    gate: AdmissionGate,
    transport: Arc<dyn Transport>,
}

impl RegistryClient {
    pub fn builder() -> RegistryClientBuilder {
        RegistryClientBuilder::new()
    }

    /// Client for the default endpoint admitting `request_limit` submissions per one `unit`.
    pub fn new(unit: TimeUnit, request_limit: usize) -> Result<Self, ClientError> {
        Self::builder().rate_per(unit, request_limit).build()
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Submit `document`, waiting for admission as long as needed.
    pub async fn create_document(&self, document: &Document) -> Result<Submission, SubmitError> {
        let request = self.prepare(document)?;
        let permit = self.gate.acquire().await?;
        Ok(self.dispatch(request, permit, &document.doc_id))
    }

    /// Submit `document`, giving up if no permit is granted within `limit`.
    pub async fn create_document_timeout(
        &self,
        document: &Document,
        limit: Duration,
    ) -> Result<Submission, SubmitError> {
        let request = self.prepare(document)?;
        let permit = self.gate.acquire_timeout(limit).await?;
        Ok(self.dispatch(request, permit, &document.doc_id))
    }

    /// Stop admitting submissions. Callers waiting on the gate get `GateError::Cancelled`.
    pub fn shutdown(&self) {
        self.gate.shutdown();
    }

    fn prepare(&self, document: &Document) -> Result<PreparedRequest, SubmitError> {
        let body = document.to_payload().map_err(SubmitError::Payload)?;
        Ok(PreparedRequest {
            method: Method::POST,
            url: self.endpoint.clone(),
            headers: self.headers.clone(),
            body,
        })
    }

    fn dispatch(&self, request: PreparedRequest, permit: Permit, doc_id: &str) -> Submission {
        tracing::debug!(doc_id, slot = permit.slot(), "dispatching document");
        let transport = self.transport.clone();
        let doc_id = doc_id.to_string();
        let handle = tokio::spawn(async move {
            let result = transport.send(request).await;
            match &result {
                Ok(response) if !response.is_success() => {
                    let status = response.status;
                    tracing::warn!(%doc_id, %status, "registry rejected document");
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(%doc_id, %error, "document dispatch failed"),
            }
            result
        });
        Submission { permit, handle }
    }
}

/// An admitted submission whose request is in flight.
///
/// Dropping the handle does not cancel the request.
#[derive(Debug)]
pub struct Submission {
    permit: Permit,
    handle: JoinHandle<Result<TransportResponse, TransportError>>,
}

impl Submission {
    /// Permit the submission was admitted under.
    pub fn permit(&self) -> Permit {
        self.permit
    }

    /// Wait for the registry's response.
    pub async fn response(self) -> Result<TransportResponse, SubmitError> {
        Ok(self.handle.await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, GateError};

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config = ClientConfig::from_json_str(r#"{ "capacity": 3 }"#).unwrap();
        assert_eq!(config.capacity, 3);
        assert_eq!(config.window_ms, 1_000);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        let err = ClientConfig::from_json_str(r#"{ "capacity": "many" }"#).unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[tokio::test]
    async fn zero_capacity_fails_at_build() {
        let err = RegistryClient::new(TimeUnit::Second, 0).unwrap_err();
        assert!(matches!(err, ClientError::Config(ConfigError::ZeroCapacity { .. })));
    }

    #[tokio::test]
    async fn unallocatable_capacity_fails_at_build() {
        let err = RegistryClient::builder()
            .rate(usize::MAX, Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(ConfigError::CapacityTooLarge { .. })));
    }

    #[tokio::test]
    async fn relative_endpoint_is_rejected() {
        let err = RegistryClient::builder().endpoint("/documents/create").build().unwrap_err();
        assert!(matches!(err, ClientError::Endpoint(_)));
    }

    #[tokio::test]
    async fn bad_header_is_rejected() {
        let err = RegistryClient::builder().header("bad header", "x").build().unwrap_err();
        assert!(matches!(err, ClientError::Header(_)));
    }

    #[tokio::test]
    async fn clients_built_on_one_gate_share_its_window() {
        let gate = AdmissionGate::new(RateWindow::per_minute(1).unwrap()).unwrap();
        let a = RegistryClient::builder().gate(gate.clone()).build().unwrap();
        let b = RegistryClient::builder().gate(gate.clone()).build().unwrap();

        a.gate().try_acquire().unwrap();
        assert!(b.gate().try_acquire().is_err());
        b.shutdown();
        assert_eq!(a.gate().acquire().await, Err(GateError::Cancelled));
    }
}
