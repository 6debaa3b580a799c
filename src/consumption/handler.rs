//! Record handlers invoked by the consumption loop.

use tracing::{debug, info, warn};

use crate::record::SalesRecord;

/// Error type returned by handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one decoded sales record.
///
/// Return `Ok(())` when the record was processed. An `Err` is logged and
/// counted as a handler failure; the loop continues with the next record.
///
/// # Example
///
/// ```rust
/// use sales_pipeline::consumption::handler::{HandlerError, RecordHandler};
/// use sales_pipeline::record::SalesRecord;
///
/// struct Discard;
///
/// #[async_trait::async_trait]
/// impl RecordHandler for Discard {
///     async fn handle(&self, _record: &SalesRecord) -> Result<(), HandlerError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait RecordHandler: Send + Sync {
    /// Process a sales record.
    async fn handle(&self, record: &SalesRecord) -> Result<(), HandlerError>;
}

/// Logs each sale and warns about non-positive totals.
///
/// Ingestion into the store happens on the store's own stream consumer, so
/// this handler only observes the records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaleLogger {
    verbose: bool,
}

impl SaleLogger {
    /// Creates a logger. Verbose loggers log every sale at info level,
    /// quiet ones at debug level.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Returns true when the sale total is not positive.
    pub fn is_suspicious(record: &SalesRecord) -> bool {
        record.valor_total <= 0.0
    }
}

#[async_trait::async_trait]
impl RecordHandler for SaleLogger {
    async fn handle(&self, record: &SalesRecord) -> Result<(), HandlerError> {
        let category = record.categoria.as_deref().unwrap_or("-");
        let when = record.data_hora.as_deref().unwrap_or("-");

        if self.verbose {
            info!(
                id_venda = %record.id_venda,
                categoria = %category,
                valor_total = format_args!("{:.2}", record.valor_total),
                data_hora = %when,
                "Processing sale"
            );
        } else {
            debug!(
                id_venda = %record.id_venda,
                categoria = %category,
                valor_total = record.valor_total,
                "Processing sale"
            );
        }

        if Self::is_suspicious(record) {
            warn!(
                id_venda = %record.id_venda,
                valor_total = record.valor_total,
                "Sale has a non-positive total"
            );
        }

        Ok(())
    }
}
