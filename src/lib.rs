//! Sales pipeline - Kafka to Apache Pinot ingestion library
//!
//! Consumes synthetic sales records from Kafka and keeps an Apache Pinot
//! realtime table provisioned and healthy for them.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `config`: Environment-driven configuration with container/host presets
//! - `store`: Schema and table descriptors plus the store's REST client
//! - `provisioning`: Reconciliation of the store to a verified state
//! - `health`: Periodic count-query probe
//! - `transport`: Log transport trait, Kafka and scripted implementations
//! - `consumption`: Poll, decode, dispatch loop with cooperative cancellation
//! - `producer`: Sales generator and Kafka publisher
//! - `pipeline`: Startup sequences shared by the binaries
//! - `error`: Error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use sales_pipeline::config::{Config, ServiceRole};
//! use sales_pipeline::pipeline::run_ingest;
//! use sales_pipeline::store::StoreClient;
//! use sales_pipeline::transport::kafka::KafkaTransport;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env(ServiceRole::Ingest)?;
//!     let store = StoreClient::new(&config.store)?;
//!     let transport = KafkaTransport::new(&config.kafka)?;
//!
//!     let report = run_ingest(&config, store, transport, CancellationToken::new()).await?;
//!     println!("processed {}", report.stats.processed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consumption;
pub mod error;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod producer;
pub mod provisioning;
pub mod record;
pub mod shutdown;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, ServiceRole};
pub use error::{PipelineError, Result};
pub use provisioning::{ProvisioningController, ProvisioningState};
pub use record::SalesRecord;
