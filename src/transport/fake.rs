//! In-process scripted transport for loop tests
//!
//! [`ScriptedTransport`] replays a fixed sequence of poll outcomes. Once the
//! script is exhausted every poll waits out its timeout and returns `None`,
//! like an idle topic. A [`ScriptedTransportHandle`] lets the test observe
//! how often the transport was polled and closed after the transport has
//! been moved into the code under test.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sales_pipeline::transport::fake::ScriptedTransport;
//! use sales_pipeline::transport::{InboundRecord, LogTransport};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (mut transport, handle) = ScriptedTransport::new();
//! transport.push_record(InboundRecord::new("sales", 0, 0, b"{}"));
//!
//! let first = transport.poll(Duration::from_millis(10)).await.unwrap();
//! assert!(first.is_some());
//!
//! transport.close().await;
//! assert_eq!(handle.close_count(), 1);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::transport::{InboundRecord, LogTransport, PollError, TransportError};

/// One scripted poll outcome.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Deliver a record.
    Record(InboundRecord),
    /// Fail the poll.
    Error(PollError),
    /// Return `None` immediately.
    Idle,
}

#[derive(Debug, Default)]
struct Counters {
    polls: AtomicUsize,
    closes: AtomicUsize,
    subscribed: Mutex<Vec<String>>,
}

/// Scripted [`LogTransport`] for tests.
#[derive(Debug)]
pub struct ScriptedTransport {
    steps: VecDeque<ScriptStep>,
    topics: Vec<String>,
    counters: Arc<Counters>,
    closed: bool,
}

/// Observer for a [`ScriptedTransport`] that has been moved elsewhere.
#[derive(Debug, Clone)]
pub struct ScriptedTransportHandle {
    counters: Arc<Counters>,
}

impl ScriptedTransport {
    /// Creates an empty script and its handle.
    pub fn new() -> (Self, ScriptedTransportHandle) {
        let counters = Arc::new(Counters::default());
        let transport = Self {
            steps: VecDeque::new(),
            topics: Vec::new(),
            counters: Arc::clone(&counters),
            closed: false,
        };
        (transport, ScriptedTransportHandle { counters })
    }

    /// Sets the topics returned by `list_topics`.
    pub fn with_topics(mut self, topics: &[&str]) -> Self {
        self.topics = topics.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Appends a record delivery.
    pub fn push_record(&mut self, record: InboundRecord) {
        self.steps.push_back(ScriptStep::Record(record));
    }

    /// Appends a JSON payload on partition 0 with the next offset.
    pub fn push_payload(&mut self, topic: &str, payload: &[u8]) {
        let offset = self.steps.len() as i64;
        self.push_record(InboundRecord::new(topic, 0, offset, payload));
    }

    /// Appends a poll failure.
    pub fn push_error(&mut self, error: PollError) {
        self.steps.push_back(ScriptStep::Error(error));
    }

    /// Appends an immediate empty poll.
    pub fn push_idle(&mut self) {
        self.steps.push_back(ScriptStep::Idle);
    }
}

impl ScriptedTransportHandle {
    /// Number of `poll` calls so far.
    pub fn poll_count(&self) -> usize {
        self.counters.polls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls so far.
    pub fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Topics passed to the last `subscribe`.
    pub fn subscribed(&self) -> Vec<String> {
        self.counters
            .subscribed
            .lock()
            .map(|topics| topics.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LogTransport for ScriptedTransport {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Ok(mut subscribed) = self.counters.subscribed.lock() {
            *subscribed = topics.to_vec();
        }
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundRecord>, PollError> {
        self.counters.polls.fetch_add(1, Ordering::SeqCst);
        if self.closed {
            return Err(PollError::Fatal("transport is closed".to_string()));
        }

        match self.steps.pop_front() {
            Some(ScriptStep::Record(record)) => Ok(Some(record)),
            Some(ScriptStep::Error(error)) => Err(error),
            Some(ScriptStep::Idle) => Ok(None),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn list_topics(&self, _timeout: Duration) -> Result<Vec<String>, TransportError> {
        Ok(self.topics.clone())
    }

    async fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_replays_in_order() {
        let (mut transport, handle) = ScriptedTransport::new();
        transport.push_payload("sales", b"{}");
        transport.push_error(PollError::Transport("down".to_string()));
        transport.push_idle();

        let timeout = Duration::from_millis(5);
        assert!(transport.poll(timeout).await.unwrap().is_some());
        assert!(transport.poll(timeout).await.is_err());
        assert!(transport.poll(timeout).await.unwrap().is_none());
        assert!(transport.poll(timeout).await.unwrap().is_none());
        assert_eq!(handle.poll_count(), 4);
    }

    #[tokio::test]
    async fn test_subscribe_and_topics() {
        let (transport, handle) = ScriptedTransport::new();
        let mut transport = transport.with_topics(&["sales-realtime"]);

        transport
            .subscribe(&["sales-realtime".to_string()])
            .await
            .unwrap();
        assert_eq!(handle.subscribed(), vec!["sales-realtime".to_string()]);
        assert_eq!(
            transport.list_topics(Duration::from_secs(1)).await.unwrap(),
            vec!["sales-realtime".to_string()]
        );
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_calls() {
        let (mut transport, handle) = ScriptedTransport::new();
        transport.close().await;

        assert!(transport.poll(Duration::from_millis(1)).await.is_err());
        assert!(transport.subscribe(&[]).await.is_err());
        assert_eq!(handle.close_count(), 1);
    }
}
