//! Configuration Module - TOML-based Packer Configuration
//!
//! Loads and validates configuration from `config.toml`. Contract
//! addresses, market parameters and run parameters are externalized
//! here; signing keys are never part of the file and are read from the
//! environment variables each wallet entry names.

pub mod loader;

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::market::MarketMeta;
use crate::domain::params::RunConfig;
use crate::domain::session::{MethodSet, TradeMethod};

/// Top-level packer configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the packer begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Packer identity, storage and resume behavior.
  pub bot: BotConfig,
  /// RPC and relayer endpoints.
  pub network: NetworkConfig,
  /// Contract addresses.
  pub contracts: ContractsConfig,
  /// Session permit parameters.
  #[serde(default)]
  pub session: SessionConfig,
  /// Traded market metadata.
  pub market: MarketMeta,
  /// Strategy and scheduling parameters.
  pub run: RunConfig,
  /// Wallet pool.
  pub wallets: Vec<WalletConfig>,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Cross-chain deposit delivery, only needed by `deliver-deposits`.
  pub deposit_relay: Option<DepositRelayConfig>,
}

impl AppConfig {
  /// Market id as the bytes32 named in permits.
  pub fn market_id(&self) -> Result<B256> {
    self
      .market
      .market_id
      .parse::<B256>()
      .with_context(|| format!("Invalid market.market_id {:?}", self.market.market_id))
  }
}

/// Packer identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable packer name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Root directory for checkpoints and journals.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Resume an existing checkpoint instead of starting fresh.
  #[serde(default = "default_true")]
  pub resume: bool,
  /// On resume, replace the stored run parameters with `[run]`.
  #[serde(default)]
  pub resume_with_new_config: bool,
  /// Line typed on stdin that stops the packer.
  #[serde(default)]
  pub kill_key: Option<String>,
}

/// Endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  /// JSON-RPC endpoint of the chain hosting the order book.
  pub rpc_url: String,
  /// Relayer HTTP base URL.
  pub relayer_url: String,
  /// Per-request timeout.
  #[serde(default = "default_timeout_ms")]
  pub request_timeout_ms: u64,
  /// Relayer request budget.
  #[serde(default = "default_requests_per_second")]
  pub max_requests_per_second: u32,
  /// Retries of idempotent relayer reads on 5xx/network errors.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Attempts for a trade that keeps hitting nonce races.
  #[serde(default = "default_nonce_attempts")]
  pub nonce_retry_attempts: u32,
  /// Base backoff between nonce-race attempts.
  #[serde(default = "default_nonce_backoff_ms")]
  pub nonce_retry_backoff_ms: u64,
  /// Abort startup when the RPC reports another chain.
  #[serde(default)]
  pub expected_chain_id: Option<u64>,
}

/// Contract addresses (0x-prefixed hex).
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
  pub order_book: String,
  /// Collateral-accounting contract.
  pub collateral: String,
  /// EIP-712 verifying contract for session permits.
  pub session_registry: String,
}

impl ContractsConfig {
  pub fn order_book_address(&self) -> Result<Address> {
    parse_address("contracts.order_book", &self.order_book)
  }

  pub fn collateral_address(&self) -> Result<Address> {
    parse_address("contracts.collateral", &self.collateral)
  }

  pub fn session_registry_address(&self) -> Result<Address> {
    parse_address("contracts.session_registry", &self.session_registry)
  }
}

/// EIP-712 domain and method scope of session permits.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  #[serde(default = "default_domain_name")]
  pub domain_name: String,
  #[serde(default = "default_domain_version")]
  pub domain_version: String,
  /// Methods requested in each permit; all methods when absent.
  #[serde(default)]
  pub allowed_methods: Option<Vec<TradeMethod>>,
}

impl SessionConfig {
  pub fn methods(&self) -> MethodSet {
    self
      .allowed_methods
      .as_deref()
      .map_or_else(MethodSet::all, MethodSet::from_methods)
  }
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      domain_name: default_domain_name(),
      domain_version: default_domain_version(),
      allowed_methods: None,
    }
  }
}

/// One wallet of the pool.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
  pub nickname: String,
  /// Environment variable holding the hex private key.
  pub key_env: String,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// Destination chain settings for deposit delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositRelayConfig {
  /// JSON-RPC endpoint of the destination chain.
  pub rpc_url: String,
  /// Deposit receiver contract.
  pub receiver: String,
  /// Environment variable holding the delivering account's key.
  pub relayer_key_env: String,
  #[serde(default = "default_nonce_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_nonce_backoff_ms")]
  pub backoff_ms: u64,
  /// How long to wait for a delivery receipt.
  #[serde(default = "default_receipt_timeout_secs")]
  pub receipt_timeout_secs: u64,
}

impl DepositRelayConfig {
  pub fn receiver_address(&self) -> Result<Address> {
    parse_address("deposit_relay.receiver", &self.receiver)
  }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
  value
    .parse()
    .with_context(|| format!("{field} is not a valid address: {value:?}"))
}

// Default value functions for serde

fn default_receipt_timeout_secs() -> u64 {
  120
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_true() -> bool {
  true
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_requests_per_second() -> u32 {
  10
}

fn default_max_retries() -> u32 {
  3
}

fn default_nonce_attempts() -> u32 {
  5
}

fn default_nonce_backoff_ms() -> u64 {
  300
}

fn default_domain_name() -> String {
  "SessionRegistry".to_string()
}

fn default_domain_version() -> String {
  "1".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
