//! Sales publisher
//!
//! [`SalesProducer`] wraps an rdkafka `FutureProducer`. `publish` enqueues
//! the record immediately and hands back a delivery future that resolves
//! once the broker acknowledged (or rejected) the write, so the caller
//! decides whether to await it or let it run in the background.

pub mod generator;

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::KafkaSettings;
use crate::record::SalesRecord;

/// Errors raised while publishing.
#[derive(Error, Debug)]
pub enum ProducerError {
    /// The producer could not be created.
    #[error("failed to create producer: {0}")]
    Client(String),

    /// The record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The local queue rejected the record.
    #[error("failed to enqueue record for {topic}: {reason}")]
    Enqueue {
        /// Destination topic.
        topic: String,
        /// Client error.
        reason: String,
    },

    /// The broker did not acknowledge the record.
    #[error("delivery to {topic} failed: {reason}")]
    Delivery {
        /// Destination topic.
        topic: String,
        /// Client error.
        reason: String,
    },

    /// The producer was dropped before the delivery report arrived.
    #[error("delivery report for {0} was cancelled")]
    Cancelled(String),

    /// Pending records could not be flushed.
    #[error("flush failed: {0}")]
    Flush(String),
}

/// Where a record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Record key.
    pub key: String,
    /// Destination topic.
    pub topic: String,
    /// Partition written to.
    pub partition: i32,
    /// Offset assigned by the broker.
    pub offset: i64,
}

/// Future resolving to the broker's delivery report.
pub type DeliveryFuture = BoxFuture<'static, Result<DeliveryReceipt, ProducerError>>;

/// Builds the producer configuration for `settings`.
pub fn producer_config(settings: &KafkaSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &settings.bootstrap_servers)
        .set("client.id", &settings.client_id)
        .set("message.timeout.ms", "5000");
    config
}

/// Publishes sales records keyed by sale identifier.
#[derive(Clone)]
pub struct SalesProducer {
    producer: FutureProducer,
    topic: String,
}

impl SalesProducer {
    /// Creates a producer for the configured topic.
    ///
    /// # Errors
    ///
    /// Returns `ProducerError::Client` if the configuration is rejected.
    pub fn new(settings: &KafkaSettings) -> Result<Self, ProducerError> {
        let producer: FutureProducer = producer_config(settings)
            .create()
            .map_err(|e| ProducerError::Client(e.to_string()))?;

        info!(
            brokers = %settings.bootstrap_servers,
            topic = %settings.topic,
            "Created Kafka producer"
        );

        Ok(Self {
            producer,
            topic: settings.topic.clone(),
        })
    }

    /// Destination topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Enqueues `record` and returns its delivery future.
    ///
    /// # Errors
    ///
    /// Returns `ProducerError::Encode` or `ProducerError::Enqueue` when the
    /// record never left the process. Broker-side failures surface through
    /// the returned future.
    pub fn publish(&self, record: &SalesRecord) -> Result<DeliveryFuture, ProducerError> {
        let payload = record.encode()?;
        let key = record.id_venda.clone();
        let topic = self.topic.clone();

        let pending = self
            .producer
            .send_result(FutureRecord::to(&topic).key(&key).payload(&payload))
            .map_err(|(e, _)| ProducerError::Enqueue {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;

        Ok(async move {
            match pending.await {
                Ok(Ok((partition, offset))) => {
                    debug!(topic = %topic, partition, offset, key = %key, "Record delivered");
                    Ok(DeliveryReceipt {
                        key,
                        topic,
                        partition,
                        offset,
                    })
                }
                Ok(Err((e, _))) => Err(ProducerError::Delivery {
                    topic,
                    reason: e.to_string(),
                }),
                Err(_) => Err(ProducerError::Cancelled(key)),
            }
        }
        .boxed())
    }

    /// Waits up to `timeout` for every queued record to be delivered.
    ///
    /// # Errors
    ///
    /// Returns `ProducerError::Flush` when records are still pending.
    pub async fn flush(&self, timeout: Duration) -> Result<(), ProducerError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| ProducerError::Flush(e.to_string()))?
            .map_err(|e| ProducerError::Flush(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RuntimeEnvironment, ServiceRole};

    fn settings() -> KafkaSettings {
        Config::resolve(ServiceRole::Generator, RuntimeEnvironment::Container, |_| None)
            .unwrap()
            .kafka
    }

    #[test]
    fn test_producer_config() {
        let config = producer_config(&settings());
        assert_eq!(config.get("bootstrap.servers"), Some("kafka:9092"));
        assert_eq!(config.get("client.id"), Some("sales-generator"));
        assert_eq!(config.get("message.timeout.ms"), Some("5000"));
    }

    #[tokio::test]
    async fn test_publish_enqueues_without_broker() {
        let producer = SalesProducer::new(&settings()).unwrap();
        let record =
            SalesRecord::decode(br#"{"id_venda":"v1","valor_total":150.0}"#).unwrap();

        // Enqueueing is local; the delivery future is not awaited here.
        let delivery = producer.publish(&record);
        assert!(delivery.is_ok());
        assert_eq!(producer.topic(), "sales-realtime");
    }
}
