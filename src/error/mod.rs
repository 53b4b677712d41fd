use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Configuration errors
    ConfigMissingRequired,
    ConfigInvalidUrl,
    ConfigInvalidInterval,
    ConfigInvalidBatchSize,

    // Network errors
    NetworkError,

    // HTTP errors
    HttpBadRequest,
    HttpUnauthorized,
    HttpForbidden,
    HttpNotFound,
    HttpRateLimited,
    HttpClientError,
    HttpServerError,
    HttpTimeout,
    HttpNetworkError,
    HttpInvalidResponse,

    // Event errors
    EventSerializationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingRequired => "CONFIG_MISSING_REQUIRED",
            ErrorCode::ConfigInvalidUrl => "CONFIG_INVALID_URL",
            ErrorCode::ConfigInvalidInterval => "CONFIG_INVALID_INTERVAL",
            ErrorCode::ConfigInvalidBatchSize => "CONFIG_INVALID_BATCH_SIZE",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::HttpBadRequest => "HTTP_BAD_REQUEST",
            ErrorCode::HttpUnauthorized => "HTTP_UNAUTHORIZED",
            ErrorCode::HttpForbidden => "HTTP_FORBIDDEN",
            ErrorCode::HttpNotFound => "HTTP_NOT_FOUND",
            ErrorCode::HttpRateLimited => "HTTP_RATE_LIMITED",
            ErrorCode::HttpClientError => "HTTP_CLIENT_ERROR",
            ErrorCode::HttpServerError => "HTTP_SERVER_ERROR",
            ErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            ErrorCode::HttpNetworkError => "HTTP_NETWORK_ERROR",
            ErrorCode::HttpInvalidResponse => "HTTP_INVALID_RESPONSE",
            ErrorCode::EventSerializationFailed => "EVENT_SERIALIZATION_FAILED",
        }
    }

    /// Transient failures: server errors, timeouts and transport errors.
    ///
    /// Client errors (4xx) are never retried, rate limiting included.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError
                | ErrorCode::HttpServerError
                | ErrorCode::HttpTimeout
                | ErrorCode::HttpNetworkError
        )
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::HttpBadRequest
                | ErrorCode::HttpUnauthorized
                | ErrorCode::HttpForbidden
                | ErrorCode::HttpNotFound
                | ErrorCode::HttpRateLimited
                | ErrorCode::HttpClientError
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigMissingRequired
                | ErrorCode::ConfigInvalidUrl
                | ErrorCode::ConfigInvalidInterval
                | ErrorCode::ConfigInvalidBatchSize
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct TelemetryError {
    pub code: ErrorCode,
    pub message: String,
    /// HTTP status of the response that produced this error, if any.
    status: Option<u16>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TelemetryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: Some(Box::new(source)),
        }
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    /// Builds the error for a non-success HTTP status.
    pub fn http_status(status: u16, body: &str) -> Self {
        let (code, category) = match status {
            400 => (ErrorCode::HttpBadRequest, "Client Error"),
            401 => (ErrorCode::HttpUnauthorized, "Authentication Error"),
            403 => (ErrorCode::HttpForbidden, "Authorization Error"),
            404 => (ErrorCode::HttpNotFound, "Not Found"),
            429 => (ErrorCode::HttpRateLimited, "Rate Limited"),
            400..=499 => (ErrorCode::HttpClientError, "Client Error"),
            _ => (ErrorCode::HttpServerError, "Server Error"),
        };

        let message = if body.is_empty() {
            format!("{}: HTTP {}", category, status)
        } else {
            format!("{}: HTTP {} - {}", category, status, body)
        };

        Self {
            code,
            message,
            status: Some(status),
            source: None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn is_client_error(&self) -> bool {
        self.code.is_client_error()
    }

    pub fn is_config_error(&self) -> bool {
        self.code.is_config_error()
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
