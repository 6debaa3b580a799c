//! Steady-state health probe for the provisioned table.
//!
//! The probe runs the same count query as verification on a fixed cadence.
//! It is driven from inside the consumption loop iteration, so it never runs
//! concurrently with record handling. A failed probe is logged and never
//! triggers repair.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::consumption::metrics::record_probe;
use crate::store::client::{CountOutcome, StoreClient};

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeStatus {
    /// The table answered with this row count.
    Healthy {
        /// Rows currently in the table.
        count: i64,
    },
    /// The table did not answer a well-formed count.
    Unhealthy(String),
}

impl ProbeStatus {
    /// Returns true for `Healthy`.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Periodic count query against one table.
pub struct HealthProbe {
    client: StoreClient,
    table: String,
    cadence: Duration,
    last_check: Instant,
}

impl HealthProbe {
    /// Creates a probe whose first check is due one cadence from now.
    pub fn new(client: StoreClient, table: &str, cadence: Duration) -> Self {
        Self {
            client,
            table: table.to_string(),
            cadence,
            last_check: Instant::now(),
        }
    }

    /// Probe cadence.
    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Returns true when more than one cadence has elapsed since the last
    /// check.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_check) >= self.cadence
    }

    /// Runs the probe if it is due.
    pub async fn tick(&mut self, now: Instant) -> Option<ProbeStatus> {
        if self.is_due(now) {
            Some(self.check().await)
        } else {
            None
        }
    }

    /// Runs the probe now and restarts the cadence.
    ///
    /// With a positive count one sample row is fetched and logged; failure of
    /// that extra query is only a warning.
    pub async fn check(&mut self) -> ProbeStatus {
        self.last_check = Instant::now();

        let status = match self.client.count_rows(&self.table).await {
            Ok(CountOutcome::Rows(count)) => {
                info!(table = %self.table, count, "Store health check passed");
                if count > 0 {
                    self.log_sample().await;
                }
                ProbeStatus::Healthy { count }
            }
            Ok(CountOutcome::Exceptions(exceptions)) => {
                ProbeStatus::Unhealthy(format!("query exceptions: {:?}", exceptions))
            }
            Ok(CountOutcome::Malformed) => {
                ProbeStatus::Unhealthy("no well-formed count row".to_string())
            }
            Err(e) => ProbeStatus::Unhealthy(e.to_string()),
        };

        if let ProbeStatus::Unhealthy(reason) = &status {
            warn!(table = %self.table, reason = %reason, "Store health check failed");
        }
        record_probe(status.is_healthy());
        status
    }

    async fn log_sample(&self) {
        match self.client.sample_row(&self.table).await {
            Ok(Some(row)) => info!(table = %self.table, sample = %row, "Sample row"),
            Ok(None) => {}
            Err(e) => warn!(table = %self.table, error = %e, "Sample query failed"),
        }
    }
}
