use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::TelemetryOptions;
use crate::error::{ErrorCode, Result, TelemetryError};
use crate::types::{Event, FlagValue};

const USER_AGENT: &str = concat!("telemetry-rust/", env!("CARGO_PKG_VERSION"));

/// Request body for batch event submission.
#[derive(Debug, Serialize)]
pub struct BatchEventsRequest<'a> {
    pub events: &'a [Event],
}

/// Request body for the flag endpoint. `keys` is omitted to fetch every flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagsRequest {
    pub distinct_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl FlagsRequest {
    pub fn single(distinct_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            keys: Some(vec![key.into()]),
        }
    }

    pub fn all(distinct_id: impl Into<String>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            keys: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FlagsResponse {
    #[serde(default)]
    pub flags: HashMap<String, FlagValue>,
}

/// Wire access to the collector.
///
/// Implementations perform a single request per call; retries and failure
/// reporting are handled by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one batch of events.
    async fn send_events(&self, events: &[Event]) -> Result<()>;

    /// Resolve feature flags for a subject.
    async fn fetch_flags(&self, request: &FlagsRequest) -> Result<FlagsResponse>;
}

/// `reqwest`-backed transport.
pub struct HttpClient {
    client: Client,
    api_key: String,
    events_url: String,
    flags_url: String,
}

impl HttpClient {
    pub fn new(options: &TelemetryOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                TelemetryError::with_source(ErrorCode::NetworkError, "Failed to create HTTP client", e)
            })?;

        Ok(Self {
            client,
            api_key: options.api_key.clone(),
            events_url: options.endpoint.clone(),
            flags_url: options.flags_endpoint(),
        })
    }

    pub fn events_url(&self) -> &str {
        &self.events_url
    }

    pub fn flags_url(&self) -> &str {
        &self.flags_url
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(convert_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TelemetryError::http_status(status.as_u16(), &body))
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send_events(&self, events: &[Event]) -> Result<()> {
        self.post(&self.events_url, &BatchEventsRequest { events })
            .await
            .map(|_| ())
    }

    async fn fetch_flags(&self, request: &FlagsRequest) -> Result<FlagsResponse> {
        let response = self.post(&self.flags_url, request).await?;

        let body = response.text().await.map_err(|e| {
            TelemetryError::with_source(ErrorCode::HttpInvalidResponse, "Failed to read response", e)
        })?;

        serde_json::from_str(&body).map_err(|e| {
            TelemetryError::with_source(
                ErrorCode::HttpInvalidResponse,
                format!("Failed to parse response: {}", e),
                e,
            )
        })
    }
}

fn convert_error(error: reqwest::Error) -> TelemetryError {
    if error.is_timeout() {
        TelemetryError::with_source(ErrorCode::HttpTimeout, "Request timed out", error)
    } else if error.is_connect() {
        TelemetryError::with_source(ErrorCode::HttpNetworkError, "Connection failed", error)
    } else if error.is_builder() {
        TelemetryError::with_source(
            ErrorCode::EventSerializationFailed,
            "Failed to build request",
            error,
        )
    } else {
        TelemetryError::with_source(ErrorCode::NetworkError, error.to_string(), error)
    }
}
