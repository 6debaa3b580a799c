//! Counters emitted by the consumption loop and health probe
//!
//! No exporter is installed by this crate; counters go to whatever
//! `metrics` recorder the binary registers and are no-ops otherwise.
//!
//! # Metrics
//!
//! - `pipeline_records_processed_total`: records handled successfully
//! - `pipeline_decode_failures_total`: payloads that were not valid records
//! - `pipeline_handler_failures_total`: records the handler rejected
//! - `pipeline_poll_errors_total`: poll failures by `kind`
//! - `pipeline_health_probes_total`: probe runs by `outcome`

use metrics::increment_counter;

/// Records one successfully handled record.
pub fn record_processed() {
    increment_counter!("pipeline_records_processed_total");
}

/// Records one payload that failed to decode.
pub fn record_decode_failure() {
    increment_counter!("pipeline_decode_failures_total");
}

/// Records one handler failure.
pub fn record_handler_failure() {
    increment_counter!("pipeline_handler_failures_total");
}

/// Records one poll failure of the given kind.
pub fn record_poll_error(kind: &'static str) {
    increment_counter!("pipeline_poll_errors_total", "kind" => kind);
}

/// Records one probe run.
pub fn record_probe(healthy: bool) {
    let outcome = if healthy { "healthy" } else { "unhealthy" };
    increment_counter!("pipeline_health_probes_total", "outcome" => outcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_without_recorder_are_noops() {
        record_processed();
        record_decode_failure();
        record_handler_failure();
        record_poll_error("transport");
        record_probe(true);
        record_probe(false);
    }
}
