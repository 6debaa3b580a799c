//! Provisioning reconciliation for the analytical store.
//!
//! [`ProvisioningController`] takes the store from an unknown starting
//! condition to a verified, queryable schema and table:
//!
//! ```text
//! Init -> SchemaEnsured -> TableEnsured -> Verifying -> Verified
//!                               ^              |
//!                               |              v
//!                               +-------- Repairing (once) -> Failed
//! ```
//!
//! Ensure steps list first and create only what is missing, so re-running
//! against a consistent store issues no mutating call. `Verified` is only
//! reached after a successful count query, never from a create status alone.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::StoreSettings;
use crate::store::client::{CountOutcome, StoreClient, StoreError};
use crate::store::model::{SchemaDescriptor, TableDescriptor};

/// Repair cycles allowed per provisioning attempt.
pub const MAX_REPAIRS: u32 = 1;

/// Errors that end provisioning in the `Failed` state.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Schema creation was rejected with a non-conflict error.
    #[error("failed to create schema {name}: {source}")]
    Schema {
        /// Schema name.
        name: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// Table creation was rejected with a non-conflict error.
    #[error("failed to create table {name}: {source}")]
    Table {
        /// Table name.
        name: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// Table deletion failed during repair.
    #[error("failed to delete table {name}: {source}")]
    Delete {
        /// Table name.
        name: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// The single repair cycle has already been used.
    #[error("repair of table {table} already attempted")]
    RepairExhausted {
        /// Table name.
        table: String,
    },

    /// The table was still not queryable after repair.
    #[error("table {table} failed verification after repair")]
    VerificationFailed {
        /// Table name.
        table: String,
    },
}

/// Reconciliation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    /// Nothing checked yet.
    Init,
    /// The schema exists.
    SchemaEnsured,
    /// The table exists.
    TableEnsured,
    /// A count query is in flight.
    Verifying,
    /// The table answered a count query. Terminal.
    Verified,
    /// The table is being deleted and recreated.
    Repairing,
    /// Provisioning gave up. Terminal.
    Failed,
}

impl ProvisioningState {
    /// Returns the state name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::SchemaEnsured => "schema_ensured",
            Self::TableEnsured => "table_ensured",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::Repairing => "repairing",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Verified` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed)
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an ensure step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The resource was created by this call.
    Created,
    /// The resource was already present.
    AlreadyExists,
}

/// Result of a repair cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The table was deleted and ensured again.
    Repaired(EnsureOutcome),
}

/// Drives schema and table descriptors to a verified state.
pub struct ProvisioningController {
    client: StoreClient,
    schema: SchemaDescriptor,
    table: TableDescriptor,
    table_settle: Duration,
    repair_settle: Duration,
    state: ProvisioningState,
    history: Vec<ProvisioningState>,
    repairs_attempted: u32,
    failure: Option<ProvisionError>,
}

impl ProvisioningController {
    /// Creates a controller in the `Init` state.
    pub fn new(
        client: StoreClient,
        schema: SchemaDescriptor,
        table: TableDescriptor,
        settings: &StoreSettings,
    ) -> Self {
        Self {
            client,
            schema,
            table,
            table_settle: settings.table_settle,
            repair_settle: settings.repair_settle,
            state: ProvisioningState::Init,
            history: vec![ProvisioningState::Init],
            repairs_attempted: 0,
            failure: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    /// Every state entered so far, starting with `Init`.
    pub fn history(&self) -> &[ProvisioningState] {
        &self.history
    }

    /// Repair cycles started so far.
    pub fn repairs_attempted(&self) -> u32 {
        self.repairs_attempted
    }

    /// The error that moved the controller to `Failed`, if any.
    pub fn failure(&self) -> Option<&ProvisionError> {
        self.failure.as_ref()
    }

    /// Moves the failure out of the controller.
    pub fn take_failure(&mut self) -> Option<ProvisionError> {
        self.failure.take()
    }

    /// The table being provisioned.
    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    fn transition(&mut self, next: ProvisioningState) {
        info!(
            table = %self.table.name(),
            from = %self.state,
            to = %next,
            "Provisioning state changed"
        );
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, error: ProvisionError) -> ProvisioningState {
        error!(table = %self.table.name(), error = %error, "Provisioning failed");
        self.failure = Some(error);
        self.transition(ProvisioningState::Failed);
        self.state
    }

    /// Ensures the schema exists, creating it when it is not listed.
    ///
    /// A failed listing is logged and the create call decides.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Schema` when creation is rejected with
    /// anything other than a conflict.
    pub async fn ensure_schema(&self) -> Result<EnsureOutcome, ProvisionError> {
        let name = self.schema.name();

        match self.client.list_schemas().await {
            Ok(schemas) if schemas.iter().any(|s| s == name) => {
                info!(schema = %name, "Schema already exists");
                return Ok(EnsureOutcome::AlreadyExists);
            }
            Ok(_) => info!(schema = %name, "Schema not found, creating"),
            Err(e) => warn!(schema = %name, error = %e, "Could not list schemas, attempting creation"),
        }

        match self.client.create_schema(&self.schema).await {
            Ok(()) => Ok(EnsureOutcome::Created),
            Err(StoreError::Conflict(_)) => {
                info!(schema = %name, "Schema reported as already existing");
                Ok(EnsureOutcome::AlreadyExists)
            }
            Err(source) => Err(ProvisionError::Schema {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Ensures the table exists under its logical or physical name.
    ///
    /// After a fresh creation this waits for the table-settle interval so
    /// the store can materialize the table before it is queried.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Table` when creation is rejected with
    /// anything other than a conflict.
    pub async fn ensure_table(&self) -> Result<EnsureOutcome, ProvisionError> {
        let name = self.table.name();
        let physical = self.table.physical_name();

        match self.client.list_tables().await {
            Ok(tables) if tables.iter().any(|t| t == name || *t == physical) => {
                info!(table = %name, "Table already exists");
                return Ok(EnsureOutcome::AlreadyExists);
            }
            Ok(_) => info!(table = %name, "Table not found, creating"),
            Err(e) => warn!(table = %name, error = %e, "Could not list tables, attempting creation"),
        }

        match self.client.create_table(&self.table).await {
            Ok(()) => {
                info!(
                    table = %name,
                    settle_ms = self.table_settle.as_millis() as u64,
                    "Waiting for table to materialize"
                );
                tokio::time::sleep(self.table_settle).await;
                Ok(EnsureOutcome::Created)
            }
            Err(StoreError::Conflict(_)) => {
                info!(table = %name, "Table reported as already existing");
                Ok(EnsureOutcome::AlreadyExists)
            }
            Err(source) => Err(ProvisionError::Table {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Checks that the table answers a count query.
    ///
    /// Returns false on exceptions, a malformed response or any transport
    /// failure. Never errors.
    pub async fn verify(&self) -> bool {
        let name = self.table.name();

        match self.client.count_rows(name).await {
            Ok(CountOutcome::Rows(count)) => {
                info!(table = %name, count, "Table verified");
                true
            }
            Ok(CountOutcome::Exceptions(exceptions)) => {
                warn!(table = %name, exceptions = ?exceptions, "Verification query reported exceptions");
                false
            }
            Ok(CountOutcome::Malformed) => {
                warn!(table = %name, "Verification query returned no well-formed row");
                false
            }
            Err(e) => {
                warn!(table = %name, error = %e, "Verification query failed");
                false
            }
        }
    }

    /// Deletes the table, waits for the repair-settle interval and ensures
    /// it again. Allowed once per controller.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::RepairExhausted` on a second call, and the
    /// delete or ensure failure otherwise.
    pub async fn repair(&mut self) -> Result<RepairOutcome, ProvisionError> {
        let name = self.table.name().to_string();
        if self.repairs_attempted >= MAX_REPAIRS {
            return Err(ProvisionError::RepairExhausted { table: name });
        }
        self.repairs_attempted += 1;

        warn!(table = %name, "Repairing table by delete and recreate");
        self.client
            .delete_table(&name)
            .await
            .map_err(|source| ProvisionError::Delete {
                name: name.clone(),
                source,
            })?;

        tokio::time::sleep(self.repair_settle).await;

        let outcome = self.ensure_table().await?;
        Ok(RepairOutcome::Repaired(outcome))
    }

    /// Runs the full reconciliation and returns the terminal state.
    pub async fn provision(&mut self) -> ProvisioningState {
        if self.state.is_terminal() {
            return self.state;
        }

        match self.ensure_schema().await {
            Ok(_) => self.transition(ProvisioningState::SchemaEnsured),
            Err(e) => return self.fail(e),
        }

        match self.ensure_table().await {
            Ok(_) => self.transition(ProvisioningState::TableEnsured),
            Err(e) => return self.fail(e),
        }

        loop {
            self.transition(ProvisioningState::Verifying);
            if self.verify().await {
                self.transition(ProvisioningState::Verified);
                return self.state;
            }

            if self.repairs_attempted >= MAX_REPAIRS {
                let table = self.table.name().to_string();
                return self.fail(ProvisionError::VerificationFailed { table });
            }

            self.transition(ProvisioningState::Repairing);
            match self.repair().await {
                Ok(_) => self.transition(ProvisioningState::TableEnsured),
                Err(e) => return self.fail(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OffsetReset;
    use crate::store::model::{sales_schema, StreamSource};
    use url::Url;

    fn unreachable_controller() -> ProvisioningController {
        let settings = StoreSettings {
            controller_url: Url::parse("http://127.0.0.1:9").unwrap(),
            broker_url: Url::parse("http://127.0.0.1:9").unwrap(),
            table: "sales".to_string(),
            stream_brokers: "kafka:9092".to_string(),
            request_timeout: Duration::from_millis(200),
            table_settle: Duration::ZERO,
            repair_settle: Duration::ZERO,
        };
        let schema = sales_schema("sales").unwrap();
        let stream = StreamSource::kafka_json("sales-realtime", "kafka:9092", OffsetReset::Earliest);
        let table = TableDescriptor::realtime(&schema, "timestamp", 1, stream).unwrap();
        let client = StoreClient::new(&settings).unwrap();
        ProvisioningController::new(client, schema, table, &settings)
    }

    #[test]
    fn test_new_controller_starts_in_init() {
        let controller = unreachable_controller();
        assert_eq!(controller.state(), ProvisioningState::Init);
        assert_eq!(controller.history(), &[ProvisioningState::Init]);
        assert_eq!(controller.repairs_attempted(), 0);
        assert!(controller.failure().is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProvisioningState::Verified.is_terminal());
        assert!(ProvisioningState::Failed.is_terminal());
        assert!(!ProvisioningState::Repairing.is_terminal());
        assert_eq!(ProvisioningState::TableEnsured.to_string(), "table_ensured");
    }

    #[tokio::test]
    async fn test_verify_false_when_broker_unreachable() {
        let controller = unreachable_controller();
        assert!(!controller.verify().await);
    }

    #[tokio::test]
    async fn test_repair_allowed_once() {
        let mut controller = unreachable_controller();

        let first = controller.repair().await;
        assert!(matches!(first, Err(ProvisionError::Delete { .. })));
        assert_eq!(controller.repairs_attempted(), 1);

        let second = controller.repair().await;
        assert!(matches!(second, Err(ProvisionError::RepairExhausted { .. })));
        assert_eq!(controller.repairs_attempted(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_at_schema_creation() {
        let mut controller = unreachable_controller();

        let state = controller.provision().await;
        assert_eq!(state, ProvisioningState::Failed);
        assert!(matches!(
            controller.failure(),
            Some(ProvisionError::Schema { .. })
        ));
        assert_eq!(
            controller.history(),
            &[ProvisioningState::Init, ProvisioningState::Failed]
        );
    }
}
