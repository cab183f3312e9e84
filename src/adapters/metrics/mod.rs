//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics export on :9090 and health check endpoints
//! (/live, /ready) via axum 0.7. [`PackerObserver`] feeds both from the
//! orchestrator's telemetry hooks.

pub mod health;
pub mod prometheus;

use std::sync::Arc;
use std::time::Duration;

pub use health::{HealthServer, HealthState};
pub use prometheus::MetricsRegistry;

use crate::domain::market::{ActionKind, Side};
use crate::ports::telemetry::PackerTelemetry;

/// Telemetry sink updating the Prometheus registry and readiness.
pub struct PackerObserver {
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthState>,
}

impl PackerObserver {
    pub const fn new(metrics: Arc<MetricsRegistry>, health: Arc<HealthState>) -> Self {
        Self { metrics, health }
    }
}

impl PackerTelemetry for PackerObserver {
    fn action_submitted(&self, kind: ActionKind) {
        self.metrics.action_submitted(kind);
    }

    fn action_failed(&self, kind: ActionKind) {
        self.metrics.action_failed(kind);
    }

    fn session_created(&self) {
        self.metrics.session_created();
    }

    fn cycle_completed(&self, elapsed: Duration) {
        self.metrics.cycle_completed(elapsed);
    }

    fn open_orders(&self, wallet: &str, side: Side, count: usize) {
        self.metrics.open_orders(wallet, side, count);
    }

    fn loop_running(&self, running: bool) {
        self.health.set_loop_running(running);
    }
}
