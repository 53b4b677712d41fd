use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::core::{
    DeliveryEngine, ErrorReporter, EventQueue, EventSink, FlagResolver, TelemetryOptions,
};
use crate::error::Result;
use crate::http::{HttpClient, RetryConfig, Transport};
use crate::types::{
    new_event_id, now_rfc3339, Event, ExceptionEvent, ExceptionInfo, FlagValue, Properties,
    Severity,
};
use crate::utils::capture_frames;

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

const PLATFORM: &str = "rust";

/// Per-capture context for exception events.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub level: Severity,
    pub distinct_id: Option<String>,
    pub user: Option<Properties>,
    /// Merged over the client's static tags; these win on conflict.
    pub tags: HashMap<String, String>,
    pub extra: Option<Properties>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            level: Severity::Error,
            distinct_id: None,
            user: None,
            tags: HashMap::new(),
            extra: None,
        }
    }
}

impl CaptureOptions {
    pub fn level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    pub fn distinct_id(mut self, id: impl Into<String>) -> Self {
        self.distinct_id = Some(id.into());
        self
    }

    pub fn user(mut self, user: Properties) -> Self {
        self.user = Some(user);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn extra(mut self, extra: Properties) -> Self {
        self.extra = Some(extra);
        self
    }
}

struct FlushTimer {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

struct ClientInner {
    options: TelemetryOptions,
    queue: Arc<EventQueue>,
    engine: DeliveryEngine,
    resolver: FlagResolver,
    timer: Mutex<Option<FlushTimer>>,
    shut_down: AtomicBool,
}

impl ClientInner {
    fn enqueue(&self, event: Event) {
        let kind = event.kind();
        let len = self.queue.push(event);
        crate::lifecycle_log!(self.options.debug, kind, queue_len = len, "Event enqueued");

        self.ensure_timer();

        if len >= self.options.batch_size {
            self.engine.spawn_flush();
        }
    }

    /// Start the periodic flush on first use. Never restarts after shutdown.
    fn ensure_timer(&self) {
        let mut timer = self.timer.lock();
        if timer.is_some() || self.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            return;
        };

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let engine = self.engine.clone();
        let period = self.options.flush_interval;

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::debug!("Flush timer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        engine.spawn_flush();
                    }
                }
            }
        });

        *timer = Some(FlushTimer { stop_tx, handle });
    }

    fn stop_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            let _ = timer.stop_tx.try_send(());
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.handle.abort();
        }
    }
}

/// Telemetry client: queues events, delivers them in batches and resolves
/// feature flags.
///
/// Cloning is cheap and clones share all state. Producer methods never fail
/// and never block on the network.
#[derive(Clone)]
pub struct TelemetryClient {
    inner: Arc<ClientInner>,
}

impl TelemetryClient {
    /// Create a client that talks to `options.endpoint` over HTTP.
    pub fn new(options: TelemetryOptions) -> Result<Self> {
        options.validate()?;
        let transport = Arc::new(HttpClient::new(&options)?);
        Ok(Self::build(options, transport))
    }

    /// Create a client on top of a custom transport.
    pub fn with_transport(options: TelemetryOptions, transport: Arc<dyn Transport>) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(options, transport))
    }

    fn build(options: TelemetryOptions, transport: Arc<dyn Transport>) -> Self {
        let queue = Arc::new(EventQueue::new(options.max_queue_size));
        let engine = DeliveryEngine::new(
            Arc::clone(&queue),
            Arc::clone(&transport),
            RetryConfig::new(options.max_retries, options.retry_base_delay),
            ErrorReporter::new(options.on_error.clone()),
            options.debug,
        );

        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let owner = weak.clone();
            let sink: EventSink = Arc::new(move |event| {
                if let Some(inner) = owner.upgrade() {
                    inner.enqueue(event);
                }
            });

            ClientInner {
                resolver: FlagResolver::new(transport, options.flag_cache_ttl, sink),
                options,
                queue,
                engine,
                timer: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }
        });

        crate::lifecycle_log!(
            inner.options.debug,
            endpoint = %inner.options.endpoint,
            batch_size = inner.options.batch_size,
            "Telemetry client initialized"
        );

        Self { inner }
    }

    pub fn options(&self) -> &TelemetryOptions {
        &self.inner.options
    }

    /// Queue a prebuilt event.
    pub fn enqueue(&self, event: Event) {
        self.inner.enqueue(event);
    }

    pub fn track(
        &self,
        distinct_id: impl Into<String>,
        event: impl Into<String>,
        properties: Option<Properties>,
    ) {
        self.enqueue(Event::track(distinct_id, event, properties));
    }

    pub fn identify(&self, distinct_id: impl Into<String>, traits: Option<Properties>) {
        self.enqueue(Event::identify(distinct_id, traits));
    }

    pub fn group(
        &self,
        distinct_id: impl Into<String>,
        group_id: impl Into<String>,
        traits: Option<Properties>,
    ) {
        self.enqueue(Event::group(distinct_id, group_id, traits));
    }

    /// Queue a message event. Returns its event id.
    pub fn capture_message(&self, message: impl Into<String>, level: Severity) -> String {
        let event = Event::message(message, level, self.inner.options.tags.clone());
        let event_id = event.event_id().unwrap_or_default().to_string();
        self.enqueue(event);
        event_id
    }

    /// Queue an exception event. Returns its event id.
    pub fn capture_exception(&self, exception: ExceptionInfo, capture: CaptureOptions) -> String {
        let options = &self.inner.options;
        let mut tags = options.tags.clone();
        tags.extend(capture.tags);

        let event_id = new_event_id();
        self.enqueue(Event::Exception(ExceptionEvent {
            event_id: event_id.clone(),
            level: capture.level,
            platform: PLATFORM.to_string(),
            release: options.release.clone(),
            environment: options.environment.clone(),
            server_name: options.server_name.clone(),
            exception,
            distinct_id: capture.distinct_id,
            user: capture.user,
            tags,
            extra: capture.extra,
            timestamp: now_rfc3339(),
        }));
        event_id
    }

    /// Capture an error value with its `source()` chain and the current stack.
    pub fn capture_error<E>(&self, error: &E, capture: CaptureOptions) -> String
    where
        E: std::error::Error + ?Sized,
    {
        let mut exception = ExceptionInfo::new(std::any::type_name::<E>(), error.to_string())
            .frames(capture_frames());

        let mut source = error.source();
        while let Some(cause) = source {
            exception = exception.cause(cause.to_string());
            source = cause.source();
        }

        self.capture_exception(exception, capture)
    }

    /// Deliver everything queued right now. Failures go to the error callback.
    pub async fn flush(&self) {
        self.inner.engine.flush().await;
    }

    /// Stop the flush timer and deliver what is left. Only the first call
    /// does anything; later calls return immediately.
    ///
    /// Producer calls and explicit `flush()` keep working afterwards.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        crate::lifecycle_log!(self.inner.options.debug, "Telemetry client shutting down");
        self.inner.stop_timer();
        self.inner.engine.flush().await;
        crate::lifecycle_log!(self.inner.options.debug, "Telemetry client shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub async fn get_feature_flag(
        &self,
        key: &str,
        distinct_id: &str,
        default_value: Option<FlagValue>,
    ) -> Option<FlagValue> {
        self.inner
            .resolver
            .get_feature_flag(key, distinct_id, default_value)
            .await
    }

    pub async fn get_all_flags(&self, distinct_id: &str) -> HashMap<String, FlagValue> {
        self.inner.resolver.get_all_flags(distinct_id).await
    }

    pub async fn is_feature_enabled(&self, key: &str, distinct_id: &str) -> bool {
        self.inner.resolver.is_feature_enabled(key, distinct_id).await
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Copy of the queued events (for debugging).
    pub fn queued_events(&self) -> Vec<Event> {
        self.inner.queue.snapshot()
    }

    pub fn flag_cache_len(&self) -> usize {
        self.inner.resolver.cache().len()
    }

    pub fn is_timer_running(&self) -> bool {
        self.inner.timer.lock().is_some()
    }
}

pub type SharedClient = Arc<TelemetryClient>;
