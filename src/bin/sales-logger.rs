//! Logging consumer: prints every sale read from Kafka.

use sales_pipeline::config::ServiceRole;
use sales_pipeline::pipeline::{bootstrap, run_logger};
use sales_pipeline::shutdown::spawn_signal_listener;
use sales_pipeline::transport::kafka::KafkaTransport;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let Some(config) = bootstrap(ServiceRole::Logger) else {
        return;
    };

    let cancel = CancellationToken::new();
    let listener = spawn_signal_listener(cancel.clone());

    let outcome = match KafkaTransport::new(&config.kafka) {
        Ok(transport) => run_logger(&config, transport, cancel.clone()).await,
        Err(e) => Err(e.into()),
    };

    match outcome {
        Ok(report) => info!(
            processed = report.stats.processed,
            decode_failures = report.stats.decode_failures,
            "Logging consumer finished"
        ),
        Err(e) => error!(error = %e, "Logging consumer aborted"),
    }

    cancel.cancel();
    if let Err(e) = listener.await {
        debug!(error = %e, "Signal listener ended abnormally");
    }
}
