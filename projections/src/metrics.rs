//! Prometheus metrics for the indexer.
//!
//! | Metric | Type | Labels |
//! |---|---|---|
//! | `staking_indexer_events_processed_total` | counter | `kind` |
//! | `staking_indexer_events_rejected_total` | counter | `reason` |
//! | `staking_indexer_participants_created_total` | counter | |
//! | `staking_indexer_dispatch_duration_seconds` | histogram | |
//!
//! Only the recorder is installed here. Serving [`PrometheusHandle::render`]
//! over HTTP is left to the embedding process.

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register descriptions for every indexer metric.
pub fn describe_metrics() {
    describe_counter!(
        "staking_indexer_events_processed_total",
        "Total number of ledger events applied, by event kind"
    );
    describe_counter!(
        "staking_indexer_events_rejected_total",
        "Total number of ledger events rejected before any write, by reason"
    );
    describe_counter!(
        "staking_indexer_participants_created_total",
        "Total number of participant aggregates created"
    );
    describe_histogram!(
        "staking_indexer_dispatch_duration_seconds",
        "Time taken to apply one ledger event"
    );
}

/// Install a global Prometheus recorder and describe all metrics.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}
