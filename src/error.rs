//! Error types for the sales pipeline
//!
//! Each component owns a focused `thiserror` enum (configuration, store,
//! transport, provisioning, producer). [`PipelineError`] is the process-level
//! view used at startup, where every failure is fatal and aborts before any
//! record is consumed.

use thiserror::Error;

use crate::config::ConfigError;
use crate::producer::ProducerError;
use crate::provisioning::ProvisionError;
use crate::store::model::ModelError;
use crate::transport::TransportError;

/// Startup-stage failures of the pipeline
///
/// Everything in here halts the process before the consumption loop starts.
/// Steady-state failures (probe, decode, poll) never surface as a
/// `PipelineError`; they are logged and isolated by the loop.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration could not be resolved
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Schema or table descriptors are inconsistent
    #[error("Invalid resource model: {0}")]
    Model(#[from] ModelError),

    /// The analytical store did not answer on any liveness endpoint
    #[error("Store unreachable: {0}")]
    StoreUnreachable(String),

    /// The broker could not be reached or its metadata listed
    #[error("Transport unreachable: {0}")]
    TransportUnreachable(#[from] TransportError),

    /// Provisioning ended in the `Failed` state
    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] ProvisionError),

    /// The generator could not publish
    #[error("Producer error: {0}")]
    Producer(#[from] ProducerError),

    /// Logging could not be initialized
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Result type alias for pipeline binaries and orchestration code
///
/// Component APIs return their own typed errors; the top level collapses them
/// into `anyhow::Error` for context-rich reporting.
pub type Result<T> = anyhow::Result<T>;
