mod cache;
mod config;
mod delivery;
mod event_queue;
mod flags;

pub use cache::{Cache, FlagCache};
pub use config::{
    ErrorCallback, TelemetryOptions, TelemetryOptionsBuilder, DEFAULT_BATCH_SIZE,
    DEFAULT_ENDPOINT, DEFAULT_FLAG_CACHE_TTL, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_TIMEOUT,
};
pub use delivery::{DeliveryEngine, ErrorReporter};
pub use event_queue::EventQueue;
pub use flags::{EventSink, FlagResolver, FEATURE_FLAG_CALLED_EVENT};
