//! Log transport abstraction
//!
//! The [`LogTransport`] trait is the seam between the consumption loop and
//! the broker client. Implementations:
//!
//! - [`kafka::KafkaTransport`] -- rdkafka `StreamConsumer` with automatic
//!   periodic offset commit.
//! - [`fake::ScriptedTransport`] -- in-process scripted transport for tests.
//!
//! Polls are bounded by a caller-supplied timeout and yield `None` when
//! nothing arrived. Poll errors are classified so the loop can decide
//! between continuing and an orderly shutdown.

pub mod fake;
pub mod kafka;

use std::time::Duration;

use thiserror::Error;

/// Errors raised by transport setup and metadata calls.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The client could not be created from its configuration.
    #[error("failed to create client: {0}")]
    Client(String),

    /// Subscription was rejected.
    #[error("failed to subscribe to {topics:?}: {reason}")]
    Subscribe {
        /// Requested topics.
        topics: Vec<String>,
        /// Client error.
        reason: String,
    },

    /// Cluster metadata could not be fetched.
    #[error("failed to fetch metadata: {0}")]
    Metadata(String),

    /// The transport was already closed.
    #[error("transport is closed")]
    Closed,
}

/// Classified poll failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// The consumer reached the end of a partition.
    #[error("reached end of {topic} partition {partition}")]
    PartitionEof {
        /// Topic name.
        topic: String,
        /// Partition number.
        partition: i32,
    },

    /// Broker connectivity failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other recoverable consumer error.
    #[error("consumer error: {0}")]
    Consumer(String),

    /// The client is in an unrecoverable state.
    #[error("fatal consumer error: {0}")]
    Fatal(String),
}

impl PollError {
    /// Returns true when the loop must shut down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// One record delivered by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Record key.
    pub key: Option<Vec<u8>>,
    /// Record value.
    pub payload: Option<Vec<u8>>,
}

impl InboundRecord {
    /// Builds a record carrying `payload` with no key.
    pub fn new(topic: &str, partition: i32, offset: i64, payload: &[u8]) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            offset,
            key: None,
            payload: Some(payload.to_vec()),
        }
    }
}

/// Consumer side of a partitioned log.
#[async_trait::async_trait]
pub trait LogTransport: Send {
    /// Subscribes to `topics`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Subscribe`] when the client rejects the
    /// subscription, or [`TransportError::Closed`] after `close`.
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), TransportError>;

    /// Waits at most `timeout` for the next record.
    ///
    /// `Ok(None)` means nothing arrived in time and is not an error.
    ///
    /// # Errors
    ///
    /// Returns a classified [`PollError`].
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundRecord>, PollError>;

    /// Lists the topics known to the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Metadata`] when metadata cannot be fetched
    /// within `timeout`.
    async fn list_topics(&self, timeout: Duration) -> Result<Vec<String>, TransportError>;

    /// Leaves the group and releases the client. Idempotent.
    async fn close(&mut self);
}
