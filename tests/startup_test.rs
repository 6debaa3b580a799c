//! Process startup: configuration resolution plus logging installation.
//!
//! Lives in its own test binary because it installs the global subscriber.

use sales_pipeline::config::{RuntimeEnvironment, ServiceRole};
use sales_pipeline::pipeline::bootstrap_with;

#[test]
fn test_bootstrap_never_fails() {
    std::env::remove_var("RUST_LOG");

    // An unusable log file falls back to the default subscriber.
    let config = bootstrap_with(ServiceRole::Logger, RuntimeEnvironment::Host, |key| {
        (key == "PIPELINE_LOG_FILE").then(|| "/nonexistent-dir/pipeline.log".to_string())
    });
    let config = config.expect("valid configuration");
    assert_eq!(config.kafka.group_id, "sales-logger");
    assert!(tracing::dispatcher::has_been_set());

    // Invalid configuration is reported and yields no config, without panicking.
    let invalid = bootstrap_with(ServiceRole::Ingest, RuntimeEnvironment::Host, |key| {
        (key == "PINOT_BROKER_URL").then(|| "not a url".to_string())
    });
    assert!(invalid.is_none());

    let invalid = bootstrap_with(ServiceRole::Ingest, RuntimeEnvironment::Host, |key| {
        (key == "PIPELINE_HTTP_TIMEOUT_SECS").then(|| "0".to_string())
    });
    assert!(invalid.is_none());
}
