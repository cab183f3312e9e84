//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::error::PackerError;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns a [`PackerError::Config`] in the chain if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .map_err(|e| PackerError::Config(format!("cannot read {}: {e}", path.display())))?;

  let config = parse_config(&content)?;

  info!(
    name = %config.bot.name,
    wallets = config.wallets.len(),
    market = %config.market.symbol,
    mode = ?config.run.mode,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .map_err(|e| PackerError::Config(format!("invalid config.toml: {e}")))?;

  validate_config(&config)
    .map_err(|e| PackerError::Config(format!("{e:#}")))
    .context("Configuration validation failed")?;

  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(!config.bot.name.is_empty(), "bot.name must not be empty");
  anyhow::ensure!(!config.bot.data_dir.is_empty(), "bot.data_dir must not be empty");

  // Endpoints
  anyhow::ensure!(!config.network.rpc_url.is_empty(), "network.rpc_url must not be empty");
  anyhow::ensure!(
    config.network.relayer_url.starts_with("http://") || config.network.relayer_url.starts_with("https://"),
    "network.relayer_url must be an http(s) URL, got {:?}",
    config.network.relayer_url
  );
  anyhow::ensure!(
    config.network.max_requests_per_second > 0,
    "network.max_requests_per_second must be positive"
  );
  anyhow::ensure!(
    config.network.nonce_retry_attempts > 0,
    "network.nonce_retry_attempts must be at least 1"
  );

  // Contracts
  config.contracts.order_book_address()?;
  config.contracts.collateral_address()?;
  config.contracts.session_registry_address()?;

  // Market
  let market_id = config.market.market_id.trim_start_matches("0x");
  anyhow::ensure!(
    market_id.len() == 64 && market_id.chars().all(|c| c.is_ascii_hexdigit()),
    "market.market_id must be a 32-byte hex string"
  );
  anyhow::ensure!(
    config.market.tick_size > rust_decimal::Decimal::ZERO,
    "market.tick_size must be positive"
  );
  anyhow::ensure!(
    config.market.price_decimals <= 18,
    "market.price_decimals must be at most 18"
  );

  // Run parameters
  config.run.validate().context("Invalid [run] section")?;

  // Session scope
  anyhow::ensure!(
    config.session.methods().bits() != 0,
    "session.allowed_methods must not be empty"
  );

  // Wallets
  anyhow::ensure!(!config.wallets.is_empty(), "At least one wallet must be configured");
  let mut nicknames = HashSet::new();
  for (i, wallet) in config.wallets.iter().enumerate() {
    anyhow::ensure!(!wallet.key_env.is_empty(), "Wallet {i} has empty key_env");
    anyhow::ensure!(
      nicknames.insert(wallet.nickname.as_str()),
      "Duplicate wallet nickname {:?}",
      wallet.nickname
    );
  }

  if let Some(relay) = &config.deposit_relay {
    relay.receiver_address()?;
    anyhow::ensure!(relay.max_attempts > 0, "deposit_relay.max_attempts must be at least 1");
  }

  Ok(())
}
