//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. Everything is registered in a dedicated [`prometheus::Registry`]
//! under the `veilmint` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Prometheus handles are reference-counted, so clones share counters.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// JSON-RPC calls, by method.
    pub rpc_requests_total: IntCounterVec,
    /// JSON-RPC calls that returned an error, by error kind.
    pub rpc_errors_total: IntCounterVec,
    /// Time spent serving a JSON-RPC call.
    pub rpc_latency_seconds: Histogram,
    /// Tokens minted through this node.
    pub mints_total: IntCounter,
    /// Withdrawals executed through this node.
    pub withdrawals_executed_total: IntCounter,
    /// Events pushed to the WebSocket broadcast channel, by event name.
    pub events_published_total: IntCounterVec,
    /// Current total supply.
    pub total_supply: IntGauge,
    /// 1 while the sale is open, 0 otherwise.
    pub sale_active: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("veilmint".into()), None)
            .expect("failed to create prometheus registry");

        let rpc_requests_total = IntCounterVec::new(
            Opts::new("rpc_requests_total", "JSON-RPC requests served, by method"),
            &["method"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rpc_requests_total.clone()))
            .expect("metric registration");

        let rpc_errors_total = IntCounterVec::new(
            Opts::new("rpc_errors_total", "JSON-RPC requests that failed, by error kind"),
            &["kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rpc_errors_total.clone()))
            .expect("metric registration");

        let rpc_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "JSON-RPC request latency in seconds")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(rpc_latency_seconds.clone()))
            .expect("metric registration");

        let mints_total = IntCounter::new("mints_total", "Tokens minted").expect("metric creation");
        registry
            .register(Box::new(mints_total.clone()))
            .expect("metric registration");

        let withdrawals_executed_total =
            IntCounter::new("withdrawals_executed_total", "Treasury withdrawals executed")
                .expect("metric creation");
        registry
            .register(Box::new(withdrawals_executed_total.clone()))
            .expect("metric registration");

        let events_published_total = IntCounterVec::new(
            Opts::new(
                "events_published_total",
                "Registry events published to WebSocket subscribers, by event",
            ),
            &["event"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("metric registration");

        let total_supply =
            IntGauge::new("total_supply", "Tokens minted so far").expect("metric creation");
        registry
            .register(Box::new(total_supply.clone()))
            .expect("metric registration");

        let sale_active =
            IntGauge::new("sale_active", "1 while minting is open").expect("metric creation");
        registry
            .register(Box::new(sale_active.clone()))
            .expect("metric registration");

        Self {
            registry,
            rpc_requests_total,
            rpc_errors_total,
            rpc_latency_seconds,
            mints_total,
            withdrawals_executed_total,
            events_published_total,
            total_supply,
            sale_active,
        }
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

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
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
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_namespaced_metrics() {
        let metrics = NodeMetrics::new();
        metrics.mints_total.inc();
        metrics
            .rpc_requests_total
            .with_label_values(&["mintNFT"])
            .inc();
        metrics.total_supply.set(1);
        metrics
            .events_published_total
            .with_label_values(&["transfer"])
            .inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("veilmint_mints_total 1"));
        assert!(text.contains("veilmint_rpc_requests_total{method=\"mintNFT\"} 1"));
        assert!(text.contains("veilmint_total_supply 1"));
        assert!(text.contains("veilmint_events_published_total{event=\"transfer\"} 1"));
    }
}
