//! Prometheus Metrics Registry - Packer Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers submitted and failed actions, session creation, cycle
//! latency and resting orders per wallet.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::market::{ActionKind, Side};
use crate::ports::telemetry::PackerTelemetry;

/// Centralized Prometheus metrics for the packer.
///
/// All metrics follow the naming convention `packer_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Actions accepted by the relayer, by kind.
    pub actions_submitted: IntCounterVec,
    /// Actions that failed after retries, by kind.
    pub actions_failed: IntCounterVec,
    /// Sessions created.
    pub sessions_created: IntCounter,
    /// Steady-state cycle duration in milliseconds.
    pub cycle_latency_ms: HistogramVec,
    /// Resting orders per wallet and side.
    pub open_orders: IntGaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let actions_submitted = IntCounterVec::new(
            Opts::new("packer_actions_submitted_total", "Actions accepted by the relayer"),
            &["kind"],
        )?;

        let actions_failed = IntCounterVec::new(
            Opts::new("packer_actions_failed_total", "Actions that failed after retries"),
            &["kind"],
        )?;

        let sessions_created = IntCounter::new(
            "packer_sessions_created_total",
            "Trading sessions created through session-init",
        )?;

        let cycle_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "packer_cycle_latency_ms",
                "Wall time of one steady-state cycle in milliseconds",
            )
            .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]),
            &["mode"],
        )?;

        let open_orders = IntGaugeVec::new(
            Opts::new("packer_open_orders", "Resting orders per wallet and side"),
            &["wallet", "side"],
        )?;

        registry.register(Box::new(actions_submitted.clone()))?;
        registry.register(Box::new(actions_failed.clone()))?;
        registry.register(Box::new(sessions_created.clone()))?;
        registry.register(Box::new(cycle_latency_ms.clone()))?;
        registry.register(Box::new(open_orders.clone()))?;

        Ok(Self {
            registry,
            actions_submitted,
            actions_failed,
            sessions_created,
            cycle_latency_ms,
            open_orders,
        })
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl PackerTelemetry for MetricsRegistry {
    fn action_submitted(&self, kind: ActionKind) {
        self.actions_submitted.with_label_values(&[kind.as_str()]).inc();
    }

    fn action_failed(&self, kind: ActionKind) {
        self.actions_failed.with_label_values(&[kind.as_str()]).inc();
    }

    fn session_created(&self) {
        self.sessions_created.inc();
    }

    fn cycle_completed(&self, elapsed: Duration) {
        self.cycle_latency_ms
            .with_label_values(&["steady_state"])
            .observe(elapsed.as_secs_f64() * 1000.0);
    }

    fn open_orders(&self, wallet: &str, side: Side, count: usize) {
        let side = if side.is_buy() { "buy" } else { "sell" };
        self.open_orders
            .with_label_values(&[wallet, side])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.action_submitted(ActionKind::PlaceLimit);
        metrics.action_submitted(ActionKind::PlaceLimit);
        metrics.action_failed(ActionKind::CancelOne);
        metrics.open_orders("alpha", Side::Buy, 3);

        let text = metrics.render().unwrap();
        assert!(text.contains("packer_actions_submitted_total{kind=\"PLACE_LIMIT\"} 2"));
        assert!(text.contains("packer_actions_failed_total{kind=\"CANCEL_ONE\"} 1"));
        assert!(text.contains("packer_open_orders{side=\"buy\",wallet=\"alpha\"} 3"));
    }
}
