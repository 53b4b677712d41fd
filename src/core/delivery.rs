//! Batch delivery with retry and failure reporting.
//!
//! A flush takes the whole queue in one step, so concurrent flushes never
//! share events, and then posts the batch through the [`Transport`]. Every
//! failure ends in the [`ErrorReporter`]; nothing is returned to the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::config::ErrorCallback;
use super::event_queue::EventQueue;
use crate::error::TelemetryError;
use crate::http::{is_retryable, with_retry_detailed, RetryConfig, Transport};
use crate::types::Event;

/// Hands terminal failures to the user callback, containing panics.
#[derive(Clone, Default)]
pub struct ErrorReporter {
    on_error: Option<ErrorCallback>,
}

impl ErrorReporter {
    pub fn new(on_error: Option<ErrorCallback>) -> Self {
        Self { on_error }
    }

    pub fn report(&self, error: &TelemetryError) {
        if let Some(ref callback) = self.on_error {
            if catch_unwind(AssertUnwindSafe(|| callback(error))).is_err() {
                tracing::error!("Error callback panicked");
            }
        }
    }
}

#[derive(Clone)]
pub struct DeliveryEngine {
    queue: Arc<EventQueue>,
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    reporter: ErrorReporter,
    debug: bool,
}

impl DeliveryEngine {
    pub fn new(
        queue: Arc<EventQueue>,
        transport: Arc<dyn Transport>,
        retry: RetryConfig,
        reporter: ErrorReporter,
        debug: bool,
    ) -> Self {
        Self {
            queue,
            transport,
            retry,
            reporter,
            debug,
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Drain the queue and deliver it as one batch. Resolves immediately when
    /// the queue is empty.
    pub async fn flush(&self) {
        let batch = self.queue.take_all();
        self.deliver(batch).await;
    }

    /// Take the current batch now and deliver it on a background task.
    ///
    /// Without a tokio runtime the queue is left untouched for the next
    /// explicit flush.
    pub fn spawn_flush(&self) -> Option<JoinHandle<()>> {
        let handle = Handle::try_current().ok()?;

        let batch = self.queue.take_all();
        if batch.is_empty() {
            return None;
        }

        let engine = self.clone();
        Some(handle.spawn(async move { engine.deliver(batch).await }))
    }

    /// Post a batch, retrying transient failures with backoff.
    pub async fn deliver(&self, batch: Vec<Event>) {
        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        let transport = Arc::clone(&self.transport);
        let result = with_retry_detailed(
            || transport.send_events(&batch),
            &self.retry,
            is_retryable,
        )
        .await;

        match result.outcome {
            Ok(()) => {
                crate::lifecycle_log!(
                    self.debug,
                    count,
                    attempts = result.attempts,
                    "Delivered event batch"
                );
            }
            Err(error) => {
                tracing::warn!(
                    count,
                    attempts = result.attempts,
                    code = %error.code,
                    status = ?error.status(),
                    "Event delivery failed: {}",
                    error.message
                );
                self.reporter.report(&error);
            }
        }
    }
}
