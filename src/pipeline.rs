//! Process-level orchestration shared by the binaries.
//!
//! Each `run_*` function takes a resolved [`Config`] and an already built
//! transport, so the same startup sequence runs against Kafka in production
//! and against a scripted transport in tests.

use std::fmt;
use std::time::Duration;

use chrono::Local;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, LoggingConfig, RuntimeEnvironment, ServiceRole};
use crate::consumption::handler::SaleLogger;
use crate::consumption::{ConsumptionLoop, LoopReport};
use crate::error::PipelineError;
use crate::health::HealthProbe;
use crate::logging::{init_logging, init_logging_with_fallback};
use crate::producer::generator::SaleGenerator;
use crate::producer::SalesProducer;
use crate::provisioning::{ProvisionError, ProvisioningController, ProvisioningState};
use crate::store::client::StoreClient;
use crate::store::model::sales_dataset;
use crate::transport::LogTransport;

/// Bound on the final producer flush.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves configuration for `role` from the process environment and
/// installs logging.
///
/// Returns `None` once an invalid configuration has been logged, so the
/// binaries can exit cleanly.
pub fn bootstrap(role: ServiceRole) -> Option<Config> {
    bootstrap_with(role, RuntimeEnvironment::detect(), |key| {
        std::env::var(key).ok()
    })
}

/// [`bootstrap`] with an explicit environment and variable lookup.
///
/// A rejected logging setup falls back to the defaults. Nothing here fails.
pub fn bootstrap_with<F>(
    role: ServiceRole,
    environment: RuntimeEnvironment,
    lookup: F,
) -> Option<Config>
where
    F: Fn(&str) -> Option<String>,
{
    match Config::resolve(role, environment, lookup) {
        Ok(config) => {
            if let Err(e) = init_logging_with_fallback(&config.logging) {
                eprintln!("{e}");
            }
            Some(config)
        }
        Err(e) => {
            if let Err(log_error) = init_logging(&LoggingConfig::default()) {
                eprintln!("{log_error}");
            }
            error!(error = %e, "Invalid configuration");
            None
        }
    }
}

/// Startup condition worth a warning but not an abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupWarning {
    /// The configured topic is not listed by the broker yet.
    MissingTopic(String),
    /// Running on the host; the store reaches the broker at another address.
    HostNetwork {
        /// Broker list the store will use.
        store_brokers: String,
    },
}

impl fmt::Display for StartupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTopic(topic) => write!(
                f,
                "topic {} does not exist yet; it must be created or auto-created before records arrive",
                topic
            ),
            Self::HostNetwork { store_brokers } => write!(
                f,
                "running on the host; the store must be able to reach the broker at {}",
                store_brokers
            ),
        }
    }
}

/// Computes the warnings for a successful broker metadata listing.
pub fn startup_warnings(config: &Config, topics: &[String]) -> Vec<StartupWarning> {
    let mut warnings = Vec::new();
    if !topics.iter().any(|t| *t == config.kafka.topic) {
        warnings.push(StartupWarning::MissingTopic(config.kafka.topic.clone()));
    }
    if config.environment == RuntimeEnvironment::Host {
        warnings.push(StartupWarning::HostNetwork {
            store_brokers: config.store.stream_brokers.clone(),
        });
    }
    warnings
}

/// Checks both external systems before anything is provisioned.
///
/// # Errors
///
/// Returns `PipelineError::StoreUnreachable` when no liveness endpoint
/// answers and `PipelineError::TransportUnreachable` when broker metadata
/// cannot be listed.
pub async fn check_connectivity<T: LogTransport>(
    config: &Config,
    store: &StoreClient,
    transport: &T,
) -> Result<Vec<StartupWarning>, PipelineError> {
    store
        .check_liveness()
        .await
        .map_err(|e| PipelineError::StoreUnreachable(e.to_string()))?;

    let topics = transport.list_topics(config.kafka.metadata_timeout).await?;
    info!(topics = topics.len(), "Broker is reachable");

    let warnings = startup_warnings(config, &topics);
    for warning in &warnings {
        warn!("{}", warning);
    }
    Ok(warnings)
}

/// Provisioning consumer: pre-checks, reconciles the store, then consumes
/// with the health probe until `cancel` fires.
///
/// # Errors
///
/// Returns the startup failure; nothing is consumed in that case.
pub async fn run_ingest<T: LogTransport>(
    config: &Config,
    store: StoreClient,
    mut transport: T,
    cancel: CancellationToken,
) -> Result<LoopReport, PipelineError> {
    info!(
        environment = config.environment.as_str(),
        brokers = %config.kafka.bootstrap_servers,
        topic = %config.kafka.topic,
        controller = %store.controller_url(),
        "Starting ingest consumer"
    );

    if let Err(e) = check_connectivity(config, &store, &transport).await {
        transport.close().await;
        return Err(e);
    }

    let (schema, table) = sales_dataset(&config.store, &config.kafka)?;
    let table_name = table.name().to_string();

    let mut controller = ProvisioningController::new(store.clone(), schema, table, &config.store);
    if controller.provision().await != ProvisioningState::Verified {
        transport.close().await;
        let failure = controller
            .take_failure()
            .unwrap_or(ProvisionError::VerificationFailed { table: table_name });
        return Err(failure.into());
    }

    transport.subscribe(&[config.kafka.topic.clone()]).await?;

    let probe = HealthProbe::new(store, &table_name, config.consumption.health_interval);
    let mut consumption = ConsumptionLoop::new(
        transport,
        SaleLogger::new(false),
        Some(probe),
        config.consumption.clone(),
        cancel,
    );
    Ok(consumption.run().await)
}

/// Logging consumer: consumes and logs every sale, without provisioning or
/// probing.
///
/// # Errors
///
/// Returns `PipelineError::TransportUnreachable` if subscription fails.
pub async fn run_logger<T: LogTransport>(
    config: &Config,
    mut transport: T,
    cancel: CancellationToken,
) -> Result<LoopReport, PipelineError> {
    info!(
        brokers = %config.kafka.bootstrap_servers,
        topic = %config.kafka.topic,
        group_id = %config.kafka.group_id,
        "Starting logging consumer"
    );

    if let Err(e) = transport.subscribe(&[config.kafka.topic.clone()]).await {
        transport.close().await;
        return Err(e.into());
    }

    let mut consumption = ConsumptionLoop::new(
        transport,
        SaleLogger::new(true),
        None,
        config.consumption.clone(),
        cancel,
    );
    Ok(consumption.run().await)
}

/// Totals of a generator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorReport {
    /// Records handed to the producer.
    pub published: u64,
    /// Records rejected before leaving the process.
    pub rejected: u64,
}

/// Generator: publishes a random sale after every random pause until
/// `cancel` fires, then flushes pending deliveries.
///
/// Delivery reports are awaited on background tasks and only logged.
///
/// # Errors
///
/// Returns `PipelineError::Producer` if the final flush fails.
pub async fn run_generator<R: Rng>(
    config: &Config,
    producer: &SalesProducer,
    mut generator: SaleGenerator<R>,
    cancel: CancellationToken,
) -> Result<GeneratorReport, PipelineError> {
    info!(
        brokers = %config.kafka.bootstrap_servers,
        topic = %producer.topic(),
        "Starting sales generator"
    );

    let mut report = GeneratorReport::default();

    while !cancel.is_cancelled() {
        let sale = generator.generate(Local::now());

        match producer.publish(&sale) {
            Ok(delivery) => {
                report.published += 1;
                tokio::spawn(async move {
                    if let Err(e) = delivery.await {
                        error!(error = %e, "Record delivery failed");
                    }
                });
                if report.published % config.consumption.progress_every == 0 {
                    info!(published = report.published, "Generated records so far");
                }
            }
            Err(e) => {
                report.rejected += 1;
                error!(id_venda = %sale.id_venda, error = %e, "Failed to publish record");
            }
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(generator.next_interval()) => {}
        }
    }

    info!(published = report.published, "Waiting for pending deliveries");
    producer.flush(FLUSH_TIMEOUT).await?;
    info!("Sales generator stopped");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(environment: RuntimeEnvironment) -> Config {
        Config::resolve(ServiceRole::Ingest, environment, |_| None).unwrap()
    }

    #[test]
    fn test_no_warnings_in_container_with_topic() {
        let config = config(RuntimeEnvironment::Container);
        let topics = vec!["sales-realtime".to_string(), "other".to_string()];
        assert!(startup_warnings(&config, &topics).is_empty());
    }

    #[test]
    fn test_missing_topic_and_host_network_warnings() {
        let config = config(RuntimeEnvironment::Host);
        let warnings = startup_warnings(&config, &[]);

        assert_eq!(
            warnings,
            vec![
                StartupWarning::MissingTopic("sales-realtime".to_string()),
                StartupWarning::HostNetwork {
                    store_brokers: "kafka:9092".to_string(),
                },
            ]
        );
        assert!(warnings[1].to_string().contains("kafka:9092"));
    }
}
