mod client;
pub mod retry;

pub use client::{BatchEventsRequest, FlagsRequest, FlagsResponse, HttpClient, Transport};
pub use retry::{is_retryable, with_retry_detailed, RetryConfig, RetryResult};
