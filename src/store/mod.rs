//! Analytical store integration
//!
//! [`model`] holds the validated schema and table descriptors, [`client`] the
//! REST client that creates, lists, deletes and queries them.

pub mod client;
pub mod model;

pub use client::{CountOutcome, QueryResponse, StoreClient, StoreError};
pub use model::{ModelError, SchemaDescriptor, StreamSource, TableDescriptor};
