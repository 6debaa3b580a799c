//! Provisioning consumer: reconciles the Pinot table, then consumes sales
//! from Kafka while probing the table's health.

use sales_pipeline::config::{Config, ServiceRole};
use sales_pipeline::consumption::LoopReport;
use sales_pipeline::pipeline::{bootstrap, run_ingest};
use sales_pipeline::shutdown::spawn_signal_listener;
use sales_pipeline::store::StoreClient;
use sales_pipeline::transport::kafka::KafkaTransport;
use sales_pipeline::PipelineError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

// Every outcome is logged; the process always exits with status 0.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let Some(config) = bootstrap(ServiceRole::Ingest) else {
        return;
    };

    let cancel = CancellationToken::new();
    let listener = spawn_signal_listener(cancel.clone());

    match start(&config, cancel.clone()).await {
        Ok(report) => info!(
            processed = report.stats.processed,
            decode_failures = report.stats.decode_failures,
            reason = ?report.reason,
            "Ingest consumer finished"
        ),
        Err(e) => error!(error = %e, "Ingest consumer aborted"),
    }

    cancel.cancel();
    if let Err(e) = listener.await {
        debug!(error = %e, "Signal listener ended abnormally");
    }
}

async fn start(config: &Config, cancel: CancellationToken) -> Result<LoopReport, PipelineError> {
    let store = StoreClient::new(&config.store)
        .map_err(|e| PipelineError::StoreUnreachable(e.to_string()))?;
    let transport = KafkaTransport::new(&config.kafka)?;
    run_ingest(config, store, transport, cancel).await
}
