//! Telemetry Rust SDK
//!
//! Client-side event delivery: a bounded in-memory queue, batched delivery
//! with retry and backoff, a TTL cache for remote feature flags and a
//! process-wide singleton that flushes on termination signals.
//!
//! # Quick Start
//!
//! ```no_run
//! use telemetry::{Telemetry, TelemetryOptions};
//!
//! #[tokio::main]
//! async fn main() -> telemetry::Result<()> {
//!     let options = TelemetryOptions::builder("tk_your_api_key")
//!         .environment("production")
//!         .build();
//!     let client = Telemetry::init(options)?;
//!
//!     client.identify("user-123", None);
//!     client.track("user-123", "checkout_started", None);
//!
//!     if client.is_feature_enabled("new-checkout", "user-123").await {
//!         // ...
//!     }
//!
//!     Telemetry::shutdown().await;
//!     Ok(())
//! }
//! ```

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lifecycle messages go to `info` when the client runs with `debug`
/// enabled and to `debug` otherwise.
macro_rules! lifecycle_log {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}
pub(crate) use lifecycle_log;

pub mod types;
pub mod error;
pub mod http;
pub mod core;
pub mod utils;
mod client;

pub use types::{
    Event, ExceptionEvent, ExceptionInfo, FlagValue, GroupEvent, IdentifyEvent, MessageEvent,
    Properties, Severity, StackFrame, TrackEvent,
};

pub use error::{ErrorCode, Result, TelemetryError};

pub use crate::core::{
    ErrorCallback, EventQueue, FlagCache, TelemetryOptions, TelemetryOptionsBuilder,
    FEATURE_FLAG_CALLED_EVENT,
};

pub use http::{FlagsRequest, FlagsResponse, HttpClient, RetryConfig, Transport};

pub use client::{CaptureOptions, SharedClient, TelemetryClient, SDK_VERSION};

static INSTANCE: Lazy<RwLock<Option<SharedClient>>> = Lazy::new(|| RwLock::new(None));

static SIGNAL_LISTENER: Lazy<Mutex<Option<JoinHandle<()>>>> = Lazy::new(|| Mutex::new(None));

static SIGNAL_LISTENER_READY: AtomicBool = AtomicBool::new(false);

/// Process-wide singleton around a [`TelemetryClient`].
///
/// The slot can be cleared with [`Telemetry::reset`], so tests can start
/// from a clean state.
pub struct Telemetry;

impl Telemetry {
    /// Create the singleton, or return the existing one.
    ///
    /// Options are ignored when an instance already exists. The first
    /// successful call also starts a listener thread that turns Ctrl+C and
    /// SIGTERM into a shutdown followed by process exit.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the options do not validate.
    pub fn init(options: TelemetryOptions) -> Result<SharedClient> {
        Self::install(|| TelemetryClient::new(options))
    }

    /// Like [`Telemetry::init`], delivering through a custom transport.
    pub fn init_with_transport(
        options: TelemetryOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<SharedClient> {
        Self::install(|| TelemetryClient::with_transport(options, transport))
    }

    fn install<F>(create: F) -> Result<SharedClient>
    where
        F: FnOnce() -> Result<TelemetryClient>,
    {
        let client = {
            let mut slot = INSTANCE.write();
            if let Some(existing) = slot.as_ref() {
                tracing::debug!("Telemetry already initialized, returning existing instance");
                return Ok(Arc::clone(existing));
            }

            let client = Arc::new(create()?);
            *slot = Some(Arc::clone(&client));
            client
        };

        install_signal_handler();
        Ok(client)
    }

    /// The current singleton, if initialized.
    pub fn instance() -> Option<SharedClient> {
        INSTANCE.read().clone()
    }

    pub fn is_initialized() -> bool {
        INSTANCE.read().is_some()
    }

    /// Shut down the singleton. It stays installed; repeat calls are no-ops.
    pub async fn shutdown() {
        if let Some(client) = Self::instance() {
            client.shutdown().await;
        }
    }

    /// Shut down and clear the singleton so the next `init` builds a fresh one.
    pub async fn reset() {
        let previous = INSTANCE.write().take();
        if let Some(client) = previous {
            client.shutdown().await;
        }
    }

    // Convenience methods. All are no-ops before `init`.

    pub fn track(
        distinct_id: impl Into<String>,
        event: impl Into<String>,
        properties: Option<Properties>,
    ) {
        if let Some(client) = Self::instance() {
            client.track(distinct_id, event, properties);
        }
    }

    pub fn identify(distinct_id: impl Into<String>, traits: Option<Properties>) {
        if let Some(client) = Self::instance() {
            client.identify(distinct_id, traits);
        }
    }

    pub fn capture_message(message: impl Into<String>, level: Severity) -> Option<String> {
        Self::instance().map(|client| client.capture_message(message, level))
    }

    pub fn capture_error<E>(error: &E, capture: CaptureOptions) -> Option<String>
    where
        E: std::error::Error + ?Sized,
    {
        Self::instance().map(|client| client.capture_error(error, capture))
    }

    pub async fn flush() {
        if let Some(client) = Self::instance() {
            client.flush().await;
        }
    }

    pub async fn is_feature_enabled(key: &str, distinct_id: &str) -> bool {
        match Self::instance() {
            Some(client) => client.is_feature_enabled(key, distinct_id).await,
            None => false,
        }
    }

    pub async fn get_all_flags(distinct_id: &str) -> HashMap<String, FlagValue> {
        match Self::instance() {
            Some(client) => client.get_all_flags(distinct_id).await,
            None => HashMap::new(),
        }
    }
}

/// Whether the termination-signal listener is running with its handlers
/// registered.
#[doc(hidden)]
pub fn signal_listener_active() -> bool {
    SIGNAL_LISTENER_READY.load(Ordering::SeqCst)
        && SIGNAL_LISTENER
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
}

// The listener owns its thread and runtime, so it outlives the runtime that
// made the first `init` and keeps serving every later instance.
fn install_signal_handler() {
    let mut listener = SIGNAL_LISTENER.lock();
    if listener.as_ref().is_some_and(|handle| !handle.is_finished()) {
        return;
    }
    SIGNAL_LISTENER_READY.store(false, Ordering::SeqCst);

    let spawned = thread::Builder::new()
        .name("telemetry-signals".to_string())
        .spawn(|| {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to start signal runtime, termination signals will not flush telemetry");
                    return;
                }
            };

            runtime.block_on(async {
                termination_signal().await;
                tracing::info!("Termination signal received, flushing telemetry");
                Telemetry::shutdown().await;
            });
            std::process::exit(0);
        });

    match spawned {
        Ok(handle) => *listener = Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to spawn signal thread, termination signals will not flush telemetry");
        }
    }
}

#[cfg(unix)]
async fn termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut interrupt, mut terminate) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(interrupt), Ok(terminate)) => (interrupt, terminate),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to listen for termination signals");
                return std::future::pending().await;
            }
        };
    SIGNAL_LISTENER_READY.store(true, Ordering::SeqCst);

    tokio::select! {
        _ = interrupt.recv() => {},
        _ = terminate.recv() => {},
    }
}

#[cfg(not(unix))]
async fn termination_signal() {
    SIGNAL_LISTENER_READY.store(true, Ordering::SeqCst);
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
