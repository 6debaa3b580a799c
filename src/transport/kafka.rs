//! Kafka transport built on rdkafka.
//!
//! Offsets are committed by the client's automatic periodic commit only; the
//! consumption loop never commits manually, which gives at-least-once
//! delivery.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use tracing::{debug, info};

use crate::config::KafkaSettings;
use crate::transport::{InboundRecord, LogTransport, PollError, TransportError};

/// Builds the consumer configuration for `settings`.
///
/// # Examples
///
/// ```
/// use sales_pipeline::config::{Config, RuntimeEnvironment, ServiceRole};
/// use sales_pipeline::transport::kafka::consumer_config;
///
/// let config = Config::resolve(ServiceRole::Ingest, RuntimeEnvironment::Host, |_| None).unwrap();
/// let client_config = consumer_config(&config.kafka);
/// assert_eq!(client_config.get("enable.auto.commit"), Some("true"));
/// ```
pub fn consumer_config(settings: &KafkaSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &settings.bootstrap_servers)
        .set("group.id", &settings.group_id)
        .set("client.id", &settings.client_id)
        .set("auto.offset.reset", settings.auto_offset_reset.as_str())
        .set("enable.auto.commit", "true")
        .set(
            "auto.commit.interval.ms",
            settings.auto_commit_interval.as_millis().to_string(),
        )
        .set(
            "session.timeout.ms",
            settings.session_timeout.as_millis().to_string(),
        )
        .set(
            "max.poll.interval.ms",
            settings.max_poll_interval.as_millis().to_string(),
        )
        .set("enable.partition.eof", "true");
    config
}

/// Lists cluster topics through a short-lived consumer.
///
/// Metadata fetches block, so the temporary client runs on the blocking
/// pool and is dropped before returning.
///
/// # Errors
///
/// Returns [`TransportError::Client`] if the temporary client cannot be
/// created and [`TransportError::Metadata`] if the fetch fails or times out.
pub async fn fetch_topics(
    settings: &KafkaSettings,
    timeout: Duration,
) -> Result<Vec<String>, TransportError> {
    let config = consumer_config(settings);

    tokio::task::spawn_blocking(move || {
        let consumer: BaseConsumer = config
            .create()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        let metadata = consumer
            .fetch_metadata(None, timeout)
            .map_err(|e| TransportError::Metadata(e.to_string()))?;
        Ok(metadata
            .topics()
            .iter()
            .map(|topic| topic.name().to_string())
            .collect())
    })
    .await
    .map_err(|e| TransportError::Metadata(format!("metadata task failed: {e}")))?
}

/// Maps an rdkafka error to a [`PollError`].
pub fn classify(error: &KafkaError, topic: &str) -> PollError {
    if let KafkaError::PartitionEOF(partition) = error {
        return PollError::PartitionEof {
            topic: topic.to_string(),
            partition: *partition,
        };
    }

    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::Fatal) => PollError::Fatal(error.to_string()),
        Some(
            RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::Resolve,
        ) => PollError::Transport(error.to_string()),
        _ => PollError::Consumer(error.to_string()),
    }
}

/// rdkafka-backed [`LogTransport`].
pub struct KafkaTransport {
    consumer: Option<StreamConsumer>,
    settings: KafkaSettings,
    topics: Vec<String>,
}

impl KafkaTransport {
    /// Creates an unsubscribed consumer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the configuration is rejected.
    pub fn new(settings: &KafkaSettings) -> Result<Self, TransportError> {
        let consumer: StreamConsumer = consumer_config(settings)
            .create()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        debug!(
            brokers = %settings.bootstrap_servers,
            group_id = %settings.group_id,
            "Created Kafka consumer"
        );

        Ok(Self {
            consumer: Some(consumer),
            settings: settings.clone(),
            topics: Vec::new(),
        })
    }

    fn current_topic(&self) -> &str {
        self.topics
            .first()
            .map(String::as_str)
            .unwrap_or(&self.settings.topic)
    }
}

#[async_trait::async_trait]
impl LogTransport for KafkaTransport {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), TransportError> {
        let consumer = self.consumer.as_ref().ok_or(TransportError::Closed)?;
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();

        consumer
            .subscribe(&topic_refs)
            .map_err(|e| TransportError::Subscribe {
                topics: topics.to_vec(),
                reason: e.to_string(),
            })?;

        info!(
            topics = ?topics,
            group_id = %self.settings.group_id,
            auto_offset_reset = self.settings.auto_offset_reset.as_str(),
            "Subscribed to topics"
        );
        self.topics = topics.to_vec();
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundRecord>, PollError> {
        let topic = self.current_topic().to_string();
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| PollError::Fatal("consumer is closed".to_string()))?;

        match tokio::time::timeout(timeout, consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(message)) => Ok(Some(InboundRecord {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec),
            })),
            Ok(Err(e)) => Err(classify(&e, &topic)),
        }
    }

    async fn list_topics(&self, timeout: Duration) -> Result<Vec<String>, TransportError> {
        if self.consumer.is_none() {
            return Err(TransportError::Closed);
        }
        fetch_topics(&self.settings, timeout).await
    }

    async fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            drop(consumer);
            info!(group_id = %self.settings.group_id, "Kafka consumer closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, OffsetReset, RuntimeEnvironment, ServiceRole};

    fn settings() -> KafkaSettings {
        Config::resolve(ServiceRole::Ingest, RuntimeEnvironment::Host, |_| None)
            .unwrap()
            .kafka
    }

    #[test]
    fn test_consumer_config_keys() {
        let config = consumer_config(&settings());
        assert_eq!(config.get("bootstrap.servers"), Some("localhost:29092"));
        assert_eq!(config.get("group.id"), Some("sales-pinot-consumer"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("enable.auto.commit"), Some("true"));
        assert_eq!(config.get("auto.commit.interval.ms"), Some("5000"));
        assert_eq!(config.get("session.timeout.ms"), Some("30000"));
        assert_eq!(config.get("max.poll.interval.ms"), Some("300000"));
    }

    #[test]
    fn test_consumer_config_latest() {
        let mut kafka = settings();
        kafka.auto_offset_reset = OffsetReset::Latest;
        assert_eq!(consumer_config(&kafka).get("auto.offset.reset"), Some("latest"));
    }

    #[test]
    fn test_classify_errors() {
        assert_eq!(
            classify(&KafkaError::PartitionEOF(3), "sales-realtime"),
            PollError::PartitionEof {
                topic: "sales-realtime".to_string(),
                partition: 3,
            }
        );
        assert!(matches!(
            classify(
                &KafkaError::MessageConsumption(RDKafkaErrorCode::AllBrokersDown),
                "t"
            ),
            PollError::Transport(_)
        ));
        assert!(classify(&KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal), "t").is_fatal());
        assert!(matches!(
            classify(
                &KafkaError::MessageConsumption(RDKafkaErrorCode::UnknownTopicOrPartition),
                "t"
            ),
            PollError::Consumer(_)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut transport = KafkaTransport::new(&settings()).unwrap();
        transport.close().await;
        transport.close().await;

        let result = transport.poll(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(PollError::Fatal(_))));
        assert!(matches!(
            transport.subscribe(&["sales-realtime".to_string()]).await,
            Err(TransportError::Closed)
        ));
    }
}
