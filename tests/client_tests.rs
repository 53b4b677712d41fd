mod common;

use common::{options, RecordingTransport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{
    CaptureOptions, ErrorCode, Event, ExceptionInfo, FlagValue, Severity, TelemetryClient,
    TelemetryError, TelemetryOptions, FEATURE_FLAG_CALLED_EVENT,
};

fn client(options: TelemetryOptions, transport: &Arc<RecordingTransport>) -> TelemetryClient {
    TelemetryClient::with_transport(options, transport.clone()).unwrap()
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_size_triggers_flush() {
    let transport = RecordingTransport::new();
    let opts = TelemetryOptions::builder("tk_test_key")
        .batch_size(3)
        .flush_interval(Duration::from_secs(60))
        .build();
    let client = client(opts, &transport);

    client.track("user-1", "a", None);
    client.track("user-1", "b", None);
    settle().await;
    assert_eq!(transport.send_calls(), 0);
    assert_eq!(client.queue_len(), 2);

    client.track("user-1", "c", None);
    assert_eq!(client.queue_len(), 0);
    settle().await;

    assert_eq!(transport.send_calls(), 1);
    assert_eq!(transport.delivered_names(), vec!["a", "b", "c"]);

    // The threshold re-arms: the next two enqueues wait, the third flushes.
    client.track("user-1", "d", None);
    settle().await;
    assert_eq!(transport.send_calls(), 1);
    assert_eq!(client.queue_len(), 1);

    client.track("user-1", "e", None);
    settle().await;
    assert_eq!(transport.send_calls(), 1);
    assert_eq!(client.queue_len(), 2);

    client.track("user-1", "f", None);
    assert_eq!(client.queue_len(), 0);
    settle().await;

    assert_eq!(transport.send_calls(), 2);
    assert_eq!(transport.batches()[1].len(), 3);
    assert_eq!(transport.delivered_names(), vec!["a", "b", "c", "d", "e", "f"]);
}

#[tokio::test(start_paused = true)]
async fn test_timer_flushes_after_interval() {
    let transport = RecordingTransport::new();
    let opts = TelemetryOptions::builder("tk_test_key")
        .batch_size(100)
        .flush_interval(Duration::from_millis(5000))
        .build();
    let client = client(opts, &transport);

    assert!(!client.is_timer_running());
    client.track("user-1", "a", None);
    client.track("user-1", "b", None);
    assert!(client.is_timer_running());

    tokio::time::sleep(Duration::from_millis(4999)).await;
    assert_eq!(transport.send_calls(), 0);
    assert_eq!(client.queue_len(), 2);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(transport.send_calls(), 1);
    assert_eq!(transport.batches()[0].len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_ticks_send_nothing() {
    let transport = RecordingTransport::new();
    let opts = TelemetryOptions::builder("tk_test_key")
        .flush_interval(Duration::from_secs(1))
        .build();
    let client = client(opts, &transport);

    client.track("user-1", "a", None);
    tokio::time::sleep(Duration::from_millis(5500)).await;

    assert_eq!(transport.send_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_preserves_order() {
    let transport = RecordingTransport::new();
    let client = client(options(), &transport);

    for name in ["e0", "e1", "e2", "e3", "e4"] {
        client.track("user-1", name, None);
    }
    client.flush().await;

    assert_eq!(transport.send_calls(), 1);
    assert_eq!(transport.delivered_names(), vec!["e0", "e1", "e2", "e3", "e4"]);
}

#[tokio::test(start_paused = true)]
async fn test_flush_on_empty_queue_is_noop() {
    let transport = RecordingTransport::new();
    let client = client(options(), &transport);

    client.flush().await;

    assert_eq!(transport.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_idempotent() {
    let transport = RecordingTransport::new();
    let client = client(options(), &transport);

    client.track("user-1", "a", None);
    client.shutdown().await;
    client.shutdown().await;
    client.shutdown().await;

    assert!(client.is_shut_down());
    assert!(!client.is_timer_running());
    assert_eq!(transport.send_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_after_shutdown_needs_manual_flush() {
    let transport = RecordingTransport::new();
    let opts = TelemetryOptions::builder("tk_test_key")
        .flush_interval(Duration::from_secs(1))
        .build();
    let client = client(opts, &transport);

    client.shutdown().await;
    client.track("user-1", "late", None);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!client.is_timer_running());
    assert_eq!(client.queue_len(), 1);
    assert_eq!(transport.send_calls(), 0);

    client.flush().await;
    assert_eq!(transport.delivered_names(), vec!["late"]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_flushes_neither_lose_nor_duplicate() {
    let transport = RecordingTransport::gated();
    let client = client(options(), &transport);

    for i in 0..5 {
        client.track("user-1", format!("first-{i}"), None);
    }
    let first = tokio::spawn({
        let client = client.clone();
        async move { client.flush().await }
    });
    while transport.send_calls() < 1 {
        tokio::task::yield_now().await;
    }

    for i in 0..3 {
        client.track("user-1", format!("second-{i}"), None);
    }
    let second = tokio::spawn({
        let client = client.clone();
        async move { client.flush().await }
    });
    while transport.send_calls() < 2 {
        tokio::task::yield_now().await;
    }

    transport.release(2);
    first.await.unwrap();
    second.await.unwrap();

    let batches = transport.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 5);
    assert_eq!(batches[1].len(), 3);

    let mut names = transport.delivered_names();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 8);
    assert_eq!(client.queue_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_queue_drops_oldest() {
    let transport = RecordingTransport::new();
    let opts = TelemetryOptions::builder("tk_test_key")
        .batch_size(100)
        .max_queue_size(2)
        .build();
    let client = client(opts, &transport);

    client.track("user-1", "a", None);
    client.track("user-1", "b", None);
    client.track("user-1", "c", None);
    assert_eq!(client.queue_len(), 2);

    client.flush().await;
    assert_eq!(transport.delivered_names(), vec!["b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_reaches_callback() {
    let transport = RecordingTransport::with_statuses(&[401]);
    let errors: Arc<Mutex<Vec<(ErrorCode, Option<u16>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let opts = TelemetryOptions::builder("tk_test_key")
        .on_error(move |e: &TelemetryError| sink.lock().push((e.code, e.status())))
        .build();
    let client = client(opts, &transport);

    client.track("user-1", "a", None);
    client.flush().await;

    assert_eq!(transport.send_calls(), 1);
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0], (ErrorCode::HttpUnauthorized, Some(401)));
}

#[tokio::test(start_paused = true)]
async fn test_retries_server_errors_with_backoff() {
    let transport = RecordingTransport::with_statuses(&[500, 503]);
    let client = client(options(), &transport);

    client.track("user-1", "a", None);
    let started = tokio::time::Instant::now();
    client.flush().await;

    assert_eq!(transport.send_calls(), 3);
    // 1s + 2s of backoff
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_millis(3100));
}

#[tokio::test(start_paused = true)]
async fn test_flag_lookup_is_cached_until_ttl() {
    let transport = RecordingTransport::with_flags(&[("beta", FlagValue::Bool(true))]);
    let opts = TelemetryOptions::builder("tk_test_key")
        .flag_cache_ttl(Duration::from_secs(60))
        .flush_interval(Duration::from_secs(3600))
        .build();
    let client = client(opts, &transport);

    assert!(client.is_feature_enabled("beta", "user-1").await);
    assert!(client.is_feature_enabled("beta", "user-1").await);
    assert_eq!(transport.flag_requests(), 1);
    assert_eq!(client.flag_cache_len(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(client.is_feature_enabled("beta", "user-1").await);
    assert_eq!(transport.flag_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_flag_resolution_is_tracked() {
    let transport = RecordingTransport::with_flags(&[("theme", FlagValue::from("dark"))]);
    let client = client(options(), &transport);

    let value = client.get_feature_flag("theme", "user-7", None).await;
    assert_eq!(value, Some(FlagValue::from("dark")));

    let queued = client.queued_events();
    assert_eq!(queued.len(), 1);
    let Event::Track(ref track) = queued[0] else {
        panic!("expected track event");
    };
    assert_eq!(track.event, FEATURE_FLAG_CALLED_EVENT);
    assert_eq!(track.distinct_id, "user-7");
    let properties = track.properties.as_ref().unwrap();
    assert_eq!(properties["$feature_flag"], "theme");
    assert_eq!(properties["$feature_flag_response"], "dark");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_flag_returns_default() {
    let transport = RecordingTransport::new();
    let client = client(options(), &transport);

    let value = client
        .get_feature_flag("missing", "user-1", Some(FlagValue::Bool(false)))
        .await;

    assert_eq!(value, Some(FlagValue::Bool(false)));
    assert!(!client.is_feature_enabled("missing", "user-1").await);
    assert_eq!(client.queue_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_capture_exception_merges_tags() {
    let transport = RecordingTransport::new();
    let opts = TelemetryOptions::builder("tk_test_key")
        .release("1.4.0")
        .environment("staging")
        .server_name("web-1")
        .tag("region", "eu")
        .tag("team", "payments")
        .build();
    let client = client(opts, &transport);

    let event_id = client.capture_exception(
        ExceptionInfo::new("TimeoutError", "upstream timed out"),
        CaptureOptions::default()
            .distinct_id("user-1")
            .tag("team", "checkout"),
    );

    let queued = client.queued_events();
    let Event::Exception(ref exception) = queued[0] else {
        panic!("expected exception event");
    };
    assert_eq!(exception.event_id, event_id);
    assert_eq!(exception.platform, "rust");
    assert_eq!(exception.level, Severity::Error);
    assert_eq!(exception.release.as_deref(), Some("1.4.0"));
    assert_eq!(exception.environment.as_deref(), Some("staging"));
    assert_eq!(exception.server_name.as_deref(), Some("web-1"));
    assert_eq!(exception.distinct_id.as_deref(), Some("user-1"));
    assert_eq!(exception.tags["region"], "eu");
    assert_eq!(exception.tags["team"], "checkout");
}

#[derive(Debug, thiserror::Error)]
#[error("checkout failed")]
struct CheckoutError {
    #[source]
    source: std::io::Error,
}

#[tokio::test(start_paused = true)]
async fn test_capture_error_walks_source_chain() {
    let transport = RecordingTransport::new();
    let client = client(options(), &transport);

    let error = CheckoutError {
        source: std::io::Error::new(std::io::ErrorKind::Other, "connection reset"),
    };
    client.capture_error(&error, CaptureOptions::default().level(Severity::Fatal));

    let queued = client.queued_events();
    let Event::Exception(ref event) = queued[0] else {
        panic!("expected exception event");
    };
    assert!(event.exception.kind.ends_with("CheckoutError"));
    assert_eq!(event.exception.value, "checkout failed");
    assert_eq!(event.exception.causes, vec!["connection reset"]);
    assert_eq!(event.level, Severity::Fatal);
}

#[tokio::test(start_paused = true)]
async fn test_capture_message_uses_static_tags() {
    let transport = RecordingTransport::new();
    let opts = TelemetryOptions::builder("tk_test_key").tag("region", "eu").build();
    let client = client(opts, &transport);

    let event_id = client.capture_message("cache warmed", Severity::Info);

    let queued = client.queued_events();
    let Event::Message(ref message) = queued[0] else {
        panic!("expected message event");
    };
    assert_eq!(message.event_id, event_id);
    assert_eq!(queued[0].event_id(), Some(event_id.as_str()));
    assert_eq!(message.level, Severity::Info);
    assert_eq!(message.message, "cache warmed");
    assert_eq!(message.tags["region"], "eu");
}

#[test]
fn test_enqueue_without_runtime_keeps_events() {
    let transport = RecordingTransport::new();
    let opts = TelemetryOptions::builder("tk_test_key").batch_size(2).build();
    let client = client(opts, &transport);

    client.track("user-1", "a", None);
    client.track("user-1", "b", None);
    client.track("user-1", "c", None);

    assert_eq!(client.queue_len(), 3);
    assert!(!client.is_timer_running());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(client.flush());

    assert_eq!(transport.delivered_names(), vec!["a", "b", "c"]);
}

#[test]
fn test_invalid_options_are_rejected() {
    let transport = RecordingTransport::new();
    let result = TelemetryClient::with_transport(TelemetryOptions::new(""), transport);

    assert_eq!(result.err().unwrap().code, ErrorCode::ConfigMissingRequired);
}

#[tokio::test(start_paused = true)]
async fn test_independent_clients_do_not_share_state() {
    let first_transport = RecordingTransport::new();
    let second_transport = RecordingTransport::new();
    let first = client(options(), &first_transport);
    let second = client(options(), &second_transport);

    first.track("user-1", "a", None);
    assert_eq!(first.queue_len(), 1);
    assert_eq!(second.queue_len(), 0);

    second.flush().await;
    assert_eq!(second_transport.send_calls(), 0);
    assert_eq!(first.queue_len(), 1);
}
