//! Telemetry Port - Run Observability Interface
//!
//! The orchestrator reports what it does through this trait; the
//! Prometheus adapter implements it and tests use [`NoopTelemetry`].

use std::time::Duration;

use crate::domain::market::{ActionKind, Side};

/// Sink for run-level counters and gauges.
pub trait PackerTelemetry: Send + Sync {
  /// An action was accepted by the relayer.
  fn action_submitted(&self, kind: ActionKind);

  /// An action failed after all retries.
  fn action_failed(&self, kind: ActionKind);

  /// A new session was created for a wallet.
  fn session_created(&self);

  /// One steady-state cycle finished.
  fn cycle_completed(&self, elapsed: Duration);

  /// Resting orders of one wallet on one side, as last read.
  fn open_orders(&self, wallet: &str, side: Side, count: usize);

  /// The loop entered or left steady state.
  fn loop_running(&self, _running: bool) {}
}

/// Telemetry sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl PackerTelemetry for NoopTelemetry {
  fn action_submitted(&self, _kind: ActionKind) {}

  fn action_failed(&self, _kind: ActionKind) {}

  fn session_created(&self) {}

  fn cycle_completed(&self, _elapsed: Duration) {}

  fn open_orders(&self, _wallet: &str, _side: Side, _count: usize) {}
}
