//! Sales generator: publishes random sales to Kafka until interrupted.

use sales_pipeline::config::ServiceRole;
use sales_pipeline::pipeline::{bootstrap, run_generator};
use sales_pipeline::producer::generator::SaleGenerator;
use sales_pipeline::producer::SalesProducer;
use sales_pipeline::shutdown::spawn_signal_listener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let Some(config) = bootstrap(ServiceRole::Generator) else {
        return;
    };

    let producer = match SalesProducer::new(&config.kafka) {
        Ok(producer) => producer,
        Err(e) => {
            error!(error = %e, "Sales generator aborted");
            return;
        }
    };

    let cancel = CancellationToken::new();
    let listener = spawn_signal_listener(cancel.clone());

    let generator = SaleGenerator::new(rand::rng());
    match run_generator(&config, &producer, generator, cancel.clone()).await {
        Ok(report) => info!(
            published = report.published,
            rejected = report.rejected,
            "Sales generator finished"
        ),
        Err(e) => error!(error = %e, "Sales generator failed to flush"),
    }

    cancel.cancel();
    if let Err(e) = listener.await {
        debug!(error = %e, "Signal listener ended abnormally");
    }
}
