//! Prometheus metrics for purge runs.
//!
//! Recording functions are no-ops unless the `prometheus` feature is enabled
//! and [`init_metrics`] installed the exporter.

#[cfg(feature = "prometheus")]
use metrics::counter;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()?;

    tracing::info!(listen = %config.listen, "Prometheus exporter listening");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

/// Record rows purged from a category during one run.
///
/// # Arguments
/// * `category` - The purge category (e.g., "data", "data_event", "outgoing_batch", "stranded_data")
/// * `count` - The number of rows deleted
pub fn record_purge_deletion(category: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "purge_deletions_total",
            "category" => category.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (category, count);
    }
}

/// Record one committed delete batch and the rows it removed.
pub fn record_purge_batch(category: &str, rows: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_batches_total", "category" => category.to_string()).increment(1);
        counter!("purge_batch_rows_total", "category" => category.to_string()).increment(rows);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (category, rows);
    }
}

/// Record a category whose purge stopped on an error.
pub fn record_purge_failure(category: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_failures_total", "category" => category.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = category;
    }
}

/// Record a worker tick that was skipped because the previous run of the
/// same job was still active.
pub fn record_purge_overlap(operation: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_overlaps_total", "operation" => operation.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = operation;
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
