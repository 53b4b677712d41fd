use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ErrorCode, Result, TelemetryError};

pub const DEFAULT_ENDPOINT: &str = "https://ingest.telemetry.dev/v1";
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FLAG_CACHE_TTL: Duration = Duration::from_secs(300);

/// Sink for terminal delivery failures.
pub type ErrorCallback = Arc<dyn Fn(&TelemetryError) + Send + Sync>;

#[derive(Clone)]
pub struct TelemetryOptions {
    pub api_key: String,
    pub endpoint: String,
    pub debug: bool,
    pub release: Option<String>,
    pub environment: Option<String>,
    pub server_name: Option<String>,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub timeout: Duration,
    /// `None` leaves the queue unbounded.
    pub max_queue_size: Option<usize>,
    pub flag_cache_ttl: Duration,
    pub tags: HashMap<String, String>,
    pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for TelemetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryOptions")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("debug", &self.debug)
            .field("release", &self.release)
            .field("environment", &self.environment)
            .field("server_name", &self.server_name)
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("timeout", &self.timeout)
            .field("max_queue_size", &self.max_queue_size)
            .field("flag_cache_ttl", &self.flag_cache_ttl)
            .field("tags", &self.tags)
            .field("on_error", &self.on_error.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl TelemetryOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            debug: false,
            release: None,
            environment: None,
            server_name: None,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            timeout: DEFAULT_TIMEOUT,
            max_queue_size: None,
            flag_cache_ttl: DEFAULT_FLAG_CACHE_TTL,
            tags: HashMap::new(),
            on_error: None,
        }
    }

    pub fn builder(api_key: impl Into<String>) -> TelemetryOptionsBuilder {
        TelemetryOptionsBuilder::new(api_key)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(TelemetryError::config_error(
                ErrorCode::ConfigMissingRequired,
                "API key is required",
            ));
        }

        match reqwest::Url::parse(&self.endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => {
                return Err(TelemetryError::config_error(
                    ErrorCode::ConfigInvalidUrl,
                    format!("Invalid endpoint URL: {}", self.endpoint),
                ));
            }
        }

        if self.flush_interval.is_zero() {
            return Err(TelemetryError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "Flush interval must be positive",
            ));
        }

        if self.batch_size == 0 {
            return Err(TelemetryError::config_error(
                ErrorCode::ConfigInvalidBatchSize,
                "Batch size must be positive",
            ));
        }

        Ok(())
    }

    /// Flag lookup URL, `/flags` joined onto the endpoint.
    pub(crate) fn flags_endpoint(&self) -> String {
        format!("{}/flags", self.endpoint.trim_end_matches('/'))
    }
}

pub struct TelemetryOptionsBuilder {
    options: TelemetryOptions,
}

impl TelemetryOptionsBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            options: TelemetryOptions::new(api_key),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.options.endpoint = endpoint.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    pub fn release(mut self, release: impl Into<String>) -> Self {
        self.options.release = Some(release.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.options.environment = Some(environment.into());
        self
    }

    pub fn server_name(mut self, server_name: impl Into<String>) -> Self {
        self.options.server_name = Some(server_name.into());
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.options.batch_size = size;
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.options.flush_interval = interval;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options.max_retries = retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.options.retry_base_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.options.max_queue_size = Some(size);
        self
    }

    pub fn flag_cache_ttl(mut self, ttl: Duration) -> Self {
        self.options.flag_cache_ttl = ttl;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags(mut self, tags: HashMap<String, String>) -> Self {
        self.options.tags.extend(tags);
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TelemetryError) + Send + Sync + 'static,
    {
        self.options.on_error = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> TelemetryOptions {
        self.options
    }
}
