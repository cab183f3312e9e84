//! Run parameters.
//!
//! `RunConfig` is read from the `[run]` section of `config.toml` and
//! copied into the checkpoint. It stays fixed for the lifetime of a run;
//! only an explicit resume-with-new-config replaces it.

use anyhow::{ensure, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Which decision strategy drives the wallets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Keep both sides of the book filled with non-crossing orders.
    #[default]
    Packer,
    /// One weighted random action per wallet per cycle.
    RandomFlow,
}

/// Strategy and scheduling parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub mode: StrategyMode,
    /// Lower bound of the randomized inter-cycle delay.
    pub min_delay_ms: u64,
    /// Upper bound of the randomized inter-cycle delay.
    pub max_delay_ms: u64,
    /// Smallest order amount drawn.
    pub size_min: Decimal,
    /// Largest order amount drawn.
    pub size_max: Decimal,
    /// Resting orders to keep per side and wallet.
    #[serde(default = "default_orders_per_side")]
    pub orders_per_side_per_wallet: u32,
    /// Share of available collateral a wallet may lock in orders.
    #[serde(default = "default_utilization")]
    pub max_wallet_utilization_fraction: Decimal,
    #[serde(default = "default_min_distance_ticks")]
    pub min_distance_ticks: u32,
    #[serde(default = "default_max_distance_ticks")]
    pub max_distance_ticks: u32,
    /// Scaled orders below this amount are skipped.
    #[serde(default = "default_dust_amount")]
    pub dust_amount: Decimal,
    /// Place margin orders instead of fully collateralized ones.
    #[serde(default = "default_true")]
    pub use_margin_orders: bool,
    /// Pause between two wallets inside one cycle.
    #[serde(default = "default_wallet_pause_ms")]
    pub wallet_pause_ms: u64,
    /// Lifetime requested for new session permits.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl RunConfig {
    /// Check internal consistency of the parameters.
    ///
    /// # Errors
    /// Returns a descriptive error for the first violated rule.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.min_delay_ms <= self.max_delay_ms,
            "min_delay_ms ({}) must not exceed max_delay_ms ({})",
            self.min_delay_ms,
            self.max_delay_ms
        );
        ensure!(self.size_min > Decimal::ZERO, "size_min must be positive");
        ensure!(
            self.size_min <= self.size_max,
            "size_min ({}) must not exceed size_max ({})",
            self.size_min,
            self.size_max
        );
        ensure!(
            self.orders_per_side_per_wallet > 0,
            "orders_per_side_per_wallet must be at least 1"
        );
        ensure!(
            self.max_wallet_utilization_fraction > Decimal::ZERO
                && self.max_wallet_utilization_fraction <= Decimal::ONE,
            "max_wallet_utilization_fraction must be in (0, 1], got {}",
            self.max_wallet_utilization_fraction
        );
        ensure!(self.min_distance_ticks >= 1, "min_distance_ticks must be at least 1");
        ensure!(
            self.min_distance_ticks <= self.max_distance_ticks,
            "min_distance_ticks ({}) must not exceed max_distance_ticks ({})",
            self.min_distance_ticks,
            self.max_distance_ticks
        );
        ensure!(self.dust_amount >= Decimal::ZERO, "dust_amount must not be negative");
        ensure!(
            self.session_ttl_secs > 120,
            "session_ttl_secs must leave room for the 60s renewal margin"
        );
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: StrategyMode::Packer,
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
            size_min: dec!(0.01),
            size_max: dec!(0.1),
            orders_per_side_per_wallet: default_orders_per_side(),
            max_wallet_utilization_fraction: default_utilization(),
            min_distance_ticks: default_min_distance_ticks(),
            max_distance_ticks: default_max_distance_ticks(),
            dust_amount: default_dust_amount(),
            use_margin_orders: true,
            wallet_pause_ms: default_wallet_pause_ms(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_orders_per_side() -> u32 {
    3
}

fn default_utilization() -> Decimal {
    dec!(0.2)
}

fn default_min_distance_ticks() -> u32 {
    10
}

fn default_max_distance_ticks() -> u32 {
    50
}

fn default_dust_amount() -> Decimal {
    dec!(0.0001)
}

fn default_true() -> bool {
    true
}

fn default_wallet_pause_ms() -> u64 {
    250
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_delay_rejected() {
        let cfg = RunConfig {
            min_delay_ms: 10,
            max_delay_ms: 5,
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_utilization_bounds() {
        let cfg = RunConfig {
            max_wallet_utilization_fraction: dec!(1.5),
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let toml_src = r#"
            min_delay_ms = 100
            max_delay_ms = 200
            size_min = "0.5"
            size_max = "1.5"
        "#;
        let cfg: RunConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.mode, StrategyMode::Packer);
        assert_eq!(cfg.orders_per_side_per_wallet, 3);
        assert_eq!(cfg.size_max, dec!(1.5));
        assert!(cfg.use_margin_orders);
    }
}
