use once_cell::sync::Lazy;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::error::MaintenanceOp;

pub static METRICS: Lazy<PartwrightMetrics> = Lazy::new(PartwrightMetrics::init);

pub struct PartwrightMetrics {
    /// Registry the Prometheus exporter publishes into
    pub registry: Registry,
    /// `None` when the exporter could not be built; instruments then record into the
    /// global no-op meter
    pub provider: Option<SdkMeterProvider>,
    pub statements_total: Counter<u64>,
    pub statement_errors_total: Counter<u64>,
    pub statement_duration: Histogram<f64>,
    pub apply_failures_total: Counter<u64>,
    pub maintenance_total: Counter<u64>,
}

impl PartwrightMetrics {
    pub fn init() -> Self {
        let registry = Registry::new();
        let provider = match opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
        {
            Ok(exporter) => {
                let provider = SdkMeterProvider::builder().with_reader(exporter).build();
                global::set_meter_provider(provider.clone());
                Some(provider)
            }
            Err(e) => {
                log::warn!("Prometheus exporter unavailable, metrics will not be exported: {e}");
                None
            }
        };
        let meter = global::meter("partwright");

        let statements_total = meter
            .u64_counter("partwright_statements_total")
            .with_description("Total DDL statements executed")
            .build();

        let statement_errors_total = meter
            .u64_counter("partwright_statement_errors_total")
            .with_description("DDL statements that failed")
            .build();

        let statement_duration = meter
            .f64_histogram("partwright_statement_duration_seconds")
            .with_description("Duration of DDL statements")
            .build();

        let apply_failures_total = meter
            .u64_counter("partwright_apply_failures_total")
            .with_description("Partition plans rolled back after a failed statement")
            .build();

        let maintenance_total = meter
            .u64_counter("partwright_maintenance_operations_total")
            .with_description("Standalone maintenance operations by kind and outcome")
            .build();

        Self {
            registry,
            provider,
            statements_total,
            statement_errors_total,
            statement_duration,
            apply_failures_total,
            maintenance_total,
        }
    }

    /// Current values in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_statement(&self, elapsed: std::time::Duration) {
        self.statements_total.add(1, &[]);
        self.statement_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_statement_error(&self) {
        self.statement_errors_total.add(1, &[]);
    }

    pub fn record_apply_failure(&self, table: &str) {
        self.apply_failures_total
            .add(1, &[KeyValue::new("table", table.to_string())]);
    }

    pub fn record_maintenance(&self, operation: MaintenanceOp, success: bool) {
        self.maintenance_total.add(
            1,
            &[
                KeyValue::new("operation", operation.to_string()),
                KeyValue::new("success", success),
            ],
        );
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recorded_statements_reach_the_registry() {
        METRICS.record_statement(Duration::from_millis(3));
        METRICS.record_maintenance(MaintenanceOp::Analyze, true);

        let text = METRICS.gather_text().unwrap();
        assert!(text.contains("partwright_statements_total"));
        assert!(text.contains("partwright_maintenance_operations_total"));
    }
}
