//! # Internal Metrics Module
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: The entry point for initializing the metrics system.
//!   It installs the Prometheus recorder and returns the handle used by the
//!   `/metrics` route of the HTTP server.
//!
//! - **`Metrics`**: A lightweight, cloneable struct that serves as the public
//!   API for the rest of the application to interact with the metrics system.
//!   Labeled metrics (probe failures, per-channel deliveries) are recorded
//!   with the `metrics` macros at the call site.

use crate::config::MetricsConfig;
use metrics::{Counter, Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tracing::error;

/// Histogram buckets for batch run durations, in seconds.
const RUN_DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// The public API for the metrics system.
///
/// This struct holds cloneable handles to the metrics collectors.
#[derive(Clone)]
pub struct Metrics {
    pub domains_checked_total: Counter,
    pub ledger_errors_total: Counter,
    pub batch_run_duration_seconds: Histogram,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("domains_checked_total", Unit::Count, "Total number of domains probed by batch runs.");
        metrics::describe_counter!("probe_failures_total", Unit::Count, "Total number of failed probes, labeled by probe (tls, whois).");
        metrics::describe_counter!("alerts_sent_total", Unit::Count, "Total number of alerts delivered, labeled by channel.");
        metrics::describe_counter!("alerts_deduplicated_total", Unit::Count, "Total number of alerts suppressed because they were already sent today.");
        metrics::describe_counter!("notification_failures_total", Unit::Count, "Total number of failed deliveries, labeled by channel.");
        metrics::describe_counter!("ledger_errors_total", Unit::Count, "Total number of delivered alerts that could not be recorded in the ledger.");
        metrics::describe_histogram!("batch_run_duration_seconds", Unit::Seconds, "Duration of a complete batch run.");

        Self {
            domains_checked_total: metrics::counter!("domains_checked_total"),
            ledger_errors_total: metrics::counter!("ledger_errors_total"),
            batch_run_duration_seconds: metrics::histogram!("batch_run_duration_seconds"),
        }
    }

    /// Creates a `Metrics` instance that performs no operations.
    /// Used when metrics are disabled in the configuration.
    pub fn disabled() -> Self {
        Self {
            domains_checked_total: Counter::noop(),
            ledger_errors_total: Counter::noop(),
            batch_run_duration_seconds: Histogram::noop(),
        }
    }

    /// Creates a `Metrics` instance suitable for testing.
    ///
    /// No recorder is installed, so every update is a no-op.
    pub fn new_for_test() -> Self {
        Self::new()
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the Prometheus recorder as the global recorder.
    ///
    /// If metrics are disabled, or a recorder is already installed, this
    /// returns a disabled `Metrics` instance and no handle.
    pub fn build(self) -> (Metrics, Option<PrometheusHandle>) {
        if !self.config.enabled {
            return (Metrics::disabled(), None);
        }

        let builder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Full("batch_run_duration_seconds".to_string()),
            RUN_DURATION_BUCKETS,
        ) {
            Ok(builder) => builder,
            Err(e) => {
                error!(error = %e, "Invalid histogram buckets, metrics disabled");
                return (Metrics::disabled(), None);
            }
        };
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!(error = %e, "Failed to install Prometheus recorder");
            return (Metrics::disabled(), None);
        }

        (Metrics::new(), Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_builder_returns_no_handle() {
        let (_metrics, handle) = MetricsBuilder::new(MetricsConfig { enabled: false }).build();
        assert!(handle.is_none());
    }

    #[test]
    fn test_disabled_metrics_accept_updates() {
        let metrics = Metrics::disabled();
        metrics.domains_checked_total.increment(1);
        metrics.batch_run_duration_seconds.record(1.5);
    }
}
