//! Telemetry Rust SDK Lab
//!
//! Verification script that drives the SDK against a local mock collector.
//! Run with: cargo run --example sdk-lab
//! Set RUST_LOG=telemetry=debug to see lifecycle logs.

use serde_json::json;
use std::time::Duration;
use telemetry::{
    CaptureOptions, FlagValue, Properties, Severity, Telemetry, TelemetryOptions,
};
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PASS: &str = "\x1b[32m[PASS]\x1b[0m";
const FAIL: &str = "\x1b[31m[FAIL]\x1b[0m";

#[derive(Debug, thiserror::Error)]
#[error("payment declined")]
struct PaymentError {
    #[source]
    source: std::io::Error,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Telemetry Rust SDK Lab ===\n");

    let mut passed = 0;
    let mut failed = 0;

    macro_rules! pass {
        ($test:expr) => {{
            println!("{} {}", PASS, $test);
            passed += 1;
        }};
    }

    macro_rules! fail {
        ($test:expr) => {{
            println!("{} {}", FAIL, $test);
            failed += 1;
        }};
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/flags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "flags": { "lab-bool": true, "lab-variant": "blue", "lab-off": "control" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    // Initialization
    println!("Testing initialization...");
    let options = TelemetryOptions::builder("tk_lab_test_key")
        .endpoint(format!("{}/v1", server.uri()))
        .debug(true)
        .release("lab")
        .environment("development")
        .tag("lab", "true")
        .batch_size(5)
        .flush_interval(Duration::from_millis(500))
        .on_error(|e| eprintln!("delivery failed: {}", e))
        .build();

    let client = match Telemetry::init(options) {
        Ok(c) => c,
        Err(e) => {
            fail!(format!("Initialization - {}", e));
            print_summary(passed, failed);
            std::process::exit(1);
        }
    };
    pass!("Telemetry::init()");

    match Telemetry::init(TelemetryOptions::new("tk_other")) {
        Ok(again) if std::sync::Arc::ptr_eq(&client, &again) => pass!("init() returns existing instance"),
        _ => fail!("init() - expected the existing instance"),
    }

    // Flags
    println!("\nTesting feature flags...");
    if client.is_feature_enabled("lab-bool", "lab-user").await {
        pass!("is_feature_enabled() true");
    } else {
        fail!("is_feature_enabled() - expected true");
    }

    if !client.is_feature_enabled("lab-off", "lab-user").await {
        pass!("is_feature_enabled() control");
    } else {
        fail!("is_feature_enabled() - 'control' should be disabled");
    }

    let variant = client.get_feature_flag("lab-variant", "lab-user", None).await;
    if variant == Some(FlagValue::from("blue")) {
        pass!("get_feature_flag()");
    } else {
        fail!(format!("get_feature_flag() - got {:?}", variant));
    }

    let missing = client
        .get_feature_flag("non-existent", "lab-user", Some(FlagValue::Bool(true)))
        .await;
    if missing == Some(FlagValue::Bool(true)) {
        pass!("Default value for missing flag");
    } else {
        fail!(format!("Missing flag - got {:?}", missing));
    }

    if client.flag_cache_len() == 3 {
        pass!("Flag cache populated");
    } else {
        fail!(format!("Flag cache - expected 3 entries, got {}", client.flag_cache_len()));
    }

    let all = client.get_all_flags("lab-user").await;
    if all.len() == 3 {
        pass!("get_all_flags()");
    } else {
        fail!(format!("get_all_flags() - got {} flags", all.len()));
    }

    // Events
    println!("\nTesting event capture...");
    let mut properties = Properties::new();
    properties.insert("sdk".to_string(), json!("rust"));
    client.identify("lab-user", None);
    client.track("lab-user", "lab_verification", Some(properties));
    client.capture_message("lab message", Severity::Info);
    let error = PaymentError {
        source: std::io::Error::new(std::io::ErrorKind::Other, "card expired"),
    };
    let event_id = client.capture_error(&error, CaptureOptions::default().distinct_id("lab-user"));
    if !event_id.is_empty() {
        pass!("capture_error()");
    } else {
        fail!("capture_error() - empty event id");
    }

    client.flush().await;
    if client.queue_len() == 0 {
        pass!("flush()");
    } else {
        fail!(format!("flush() - {} events left", client.queue_len()));
    }

    // Shutdown
    println!("\nTesting shutdown...");
    client.track("lab-user", "before_shutdown", None);
    Telemetry::shutdown().await;
    Telemetry::shutdown().await;
    if client.is_shut_down() && client.queue_len() == 0 {
        pass!("shutdown()");
    } else {
        fail!("shutdown() - queue not drained");
    }

    Telemetry::reset().await;
    if !Telemetry::is_initialized() {
        pass!("reset()");
    } else {
        fail!("reset() - instance still installed");
    }

    let received = server.received_requests().await.unwrap_or_default();
    println!("\nCollector received {} requests", received.len());

    print_summary(passed, failed);

    if failed > 0 {
        println!("\n\x1b[31mSome verifications failed!\x1b[0m");
        std::process::exit(1);
    } else {
        println!("\n\x1b[32mAll verifications passed!\x1b[0m");
        std::process::exit(0);
    }
}

fn print_summary(passed: i32, failed: i32) {
    println!("\n{}", "=".repeat(40));
    println!("Results: {} passed, {} failed", passed, failed);
    println!("{}", "=".repeat(40));
}
