//! # Prometheus Metrics
//!
//! Settlement counters and latency for the node, scraped at `/metrics` on
//! the metrics port. Everything lives in a dedicated registry with the
//! `index_vault` prefix.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Committed deposits.
    pub deposits_total: IntCounter,
    /// Committed withdrawals.
    pub withdrawals_total: IntCounter,
    /// Rejected operations, labelled by operation and error kind.
    pub failed_operations_total: IntCounterVec,
    /// Shares minted across all vaults.
    pub shares_minted_total: IntCounter,
    /// Shares burned across all vaults.
    pub shares_burned_total: IntCounter,
    /// Price quotes published through the API.
    pub price_updates_total: IntCounter,
    /// Number of vaults.
    pub vaults: IntGauge,
    /// Wall time of deposit and withdrawal settlement, in seconds.
    pub settlement_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("index_vault".into()), None)?;

        let deposits_total = IntCounter::new("deposits_total", "Total committed deposits")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Total committed withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let failed_operations_total = IntCounterVec::new(
            Opts::new(
                "failed_operations_total",
                "Rejected operations by operation and error kind",
            ),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(failed_operations_total.clone()))?;

        let shares_minted_total =
            IntCounter::new("shares_minted_total", "Shares minted across all vaults")?;
        registry.register(Box::new(shares_minted_total.clone()))?;

        let shares_burned_total =
            IntCounter::new("shares_burned_total", "Shares burned across all vaults")?;
        registry.register(Box::new(shares_burned_total.clone()))?;

        let price_updates_total =
            IntCounter::new("price_updates_total", "Price quotes published via the API")?;
        registry.register(Box::new(price_updates_total.clone()))?;

        let vaults = IntGauge::new("vaults", "Number of vaults")?;
        registry.register(Box::new(vaults.clone()))?;

        let settlement_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "settlement_latency_seconds",
                "Deposit and withdrawal settlement latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(settlement_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            deposits_total,
            withdrawals_total,
            failed_operations_total,
            shares_minted_total,
            shares_burned_total,
            price_updates_total,
            vaults,
            settlement_latency_seconds,
        })
    }

    /// Counts a rejected operation.
    pub fn record_failure(&self, operation: &str, kind: &str) {
        self.failed_operations_total
            .with_label_values(&[operation, kind])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
