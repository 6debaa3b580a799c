//! Steady-state consumption loop
//!
//! [`ConsumptionLoop`] polls a [`LogTransport`], decodes each payload into a
//! [`SalesRecord`] and dispatches it to a [`RecordHandler`]. The optional
//! [`HealthProbe`] is ticked from inside the iteration, so record handling
//! and probing never overlap.
//!
//! Cancellation is cooperative: the token is checked once at the top of each
//! iteration and a poll never blocks longer than the configured timeout.
//! The transport is closed exactly once when the loop leaves `Running`.
//! Offsets are committed by the transport's automatic commit only.

pub mod handler;
pub mod metrics;

use std::fmt;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::config::ConsumptionSettings;
use crate::health::HealthProbe;
use crate::record::SalesRecord;
use crate::transport::{InboundRecord, LogTransport, PollError};

use self::handler::RecordHandler;

/// Lifecycle of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionState {
    /// Polling.
    Running,
    /// Leaving the loop and closing the transport.
    Stopping,
    /// Transport closed. Terminal.
    Stopped,
}

impl fmt::Display for ConsumptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token was triggered.
    Cancelled,
    /// The transport reported an unrecoverable error.
    Fatal(String),
}

/// Counters kept by the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumptionStats {
    /// Records handled successfully.
    pub processed: u64,
    /// Payloads that were not valid records.
    pub decode_failures: u64,
    /// Records the handler rejected.
    pub handler_failures: u64,
    /// End-of-partition events.
    pub partition_eofs: u64,
    /// Transport and consumer poll errors.
    pub poll_errors: u64,
    /// Probe runs.
    pub probes: u64,
    /// Probe runs that reported an unhealthy table.
    pub probe_failures: u64,
}

/// Final outcome of [`ConsumptionLoop::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    /// Final state, always `Stopped`.
    pub state: ConsumptionState,
    /// Why the loop stopped.
    pub reason: StopReason,
    /// Counters at shutdown.
    pub stats: ConsumptionStats,
}

/// Poll, decode, dispatch and probe until cancelled.
pub struct ConsumptionLoop<T, H> {
    transport: T,
    handler: H,
    probe: Option<HealthProbe>,
    settings: ConsumptionSettings,
    cancel: CancellationToken,
    state: ConsumptionState,
    stats: ConsumptionStats,
    reason: Option<StopReason>,
}

impl<T, H> ConsumptionLoop<T, H>
where
    T: LogTransport,
    H: RecordHandler,
{
    /// Creates a loop in the `Running` state.
    ///
    /// The transport must already be subscribed.
    pub fn new(
        transport: T,
        handler: H,
        probe: Option<HealthProbe>,
        settings: ConsumptionSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            handler,
            probe,
            settings,
            cancel,
            state: ConsumptionState::Running,
            stats: ConsumptionStats::default(),
            reason: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConsumptionState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> ConsumptionStats {
        self.stats
    }

    /// Runs until the token is cancelled or the transport fails fatally.
    ///
    /// Calling `run` again after the loop stopped returns the same report
    /// without touching the transport.
    pub async fn run(&mut self) -> LoopReport {
        if self.state == ConsumptionState::Running {
            info!(
                poll_timeout_ms = self.settings.poll_timeout.as_millis() as u64,
                probe = self.probe.is_some(),
                "Consumption loop started"
            );
            let reason = self.poll_until_stopped().await;
            self.shutdown(reason).await;
        }

        LoopReport {
            state: self.state,
            reason: self.reason.clone().unwrap_or(StopReason::Cancelled),
            stats: self.stats,
        }
    }

    async fn poll_until_stopped(&mut self) -> StopReason {
        loop {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping consumption");
                return StopReason::Cancelled;
            }

            let polled = self.transport.poll(self.settings.poll_timeout).await;

            if let Some(probe) = self.probe.as_mut() {
                if let Some(status) = probe.tick(Instant::now()).await {
                    self.stats.probes += 1;
                    if !status.is_healthy() {
                        self.stats.probe_failures += 1;
                    }
                }
            }

            match polled {
                Ok(None) => {}
                Ok(Some(record)) => self.dispatch(record).await,
                Err(e) => {
                    if let Some(reason) = self.on_poll_error(e) {
                        return reason;
                    }
                }
            }
        }
    }

    fn on_poll_error(&mut self, error: PollError) -> Option<StopReason> {
        match error {
            PollError::PartitionEof { topic, partition } => {
                self.stats.partition_eofs += 1;
                info!(topic = %topic, partition, "Reached end of partition");
                None
            }
            PollError::Transport(message) => {
                self.stats.poll_errors += 1;
                metrics::record_poll_error("transport");
                error!(error = %message, "Transport error while polling");
                None
            }
            PollError::Consumer(message) => {
                self.stats.poll_errors += 1;
                metrics::record_poll_error("consumer");
                error!(error = %message, "Consumer error while polling");
                None
            }
            PollError::Fatal(message) => {
                self.stats.poll_errors += 1;
                metrics::record_poll_error("fatal");
                error!(error = %message, "Fatal consumer error, shutting down");
                Some(StopReason::Fatal(message))
            }
        }
    }

    async fn dispatch(&mut self, record: InboundRecord) {
        let payload = record.payload.as_deref().unwrap_or_default();

        let sale = match SalesRecord::decode(payload) {
            Ok(sale) => sale,
            Err(e) => {
                self.stats.decode_failures += 1;
                metrics::record_decode_failure();
                error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    payload = %String::from_utf8_lossy(payload),
                    error = %e,
                    "Failed to decode record"
                );
                return;
            }
        };

        let span = tracing::info_span!(
            "handle_record",
            id_venda = %sale.id_venda,
            partition = record.partition,
            offset = record.offset,
        );

        match self.handler.handle(&sale).instrument(span).await {
            Ok(()) => {
                self.stats.processed += 1;
                metrics::record_processed();
                if self.stats.processed % self.settings.progress_every == 0 {
                    info!(processed = self.stats.processed, "Processed records so far");
                }
            }
            Err(e) => {
                self.stats.handler_failures += 1;
                metrics::record_handler_failure();
                warn!(
                    id_venda = %sale.id_venda,
                    offset = record.offset,
                    error = %e,
                    "Handler failed to process record"
                );
            }
        }
    }

    async fn shutdown(&mut self, reason: StopReason) {
        self.transition(ConsumptionState::Stopping);
        self.transport.close().await;
        self.reason = Some(reason);
        self.transition(ConsumptionState::Stopped);

        info!(
            processed = self.stats.processed,
            decode_failures = self.stats.decode_failures,
            handler_failures = self.stats.handler_failures,
            poll_errors = self.stats.poll_errors,
            "Consumption loop stopped"
        );
    }

    fn transition(&mut self, next: ConsumptionState) {
        info!(from = %self.state, to = %next, "Consumption state changed");
        self.state = next;
    }
}
