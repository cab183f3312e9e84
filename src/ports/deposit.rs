//! Deposit Port - Cross-chain Delivery Interface
//!
//! A deposit observed on the source chain is delivered to the
//! destination contract by a relayer account that pays its own gas.
//! Several relayers may race on the same account and the same deposit.

use async_trait::async_trait;
use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Deposit to deliver on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositPayload {
  pub deposit_id: B256,
  pub recipient: Address,
  /// Amount in collateral base units.
  pub amount: U256,
}

/// Deposit as recorded by the destination contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRecord {
  pub recipient: Address,
  pub amount: U256,
}

/// Trait for the destination side of the deposit bridge.
#[async_trait]
pub trait DepositDestination: Send + Sync + 'static {
  /// Account that signs delivery transactions.
  fn relayer_address(&self) -> Address;

  /// Pending transaction count of `address`.
  async fn pending_nonce(&self, address: Address) -> anyhow::Result<u64>;

  /// Broadcast the delivery transaction with an explicit nonce; returns its hash.
  async fn send_delivery(&self, payload: &DepositPayload, nonce: u64) -> anyhow::Result<String>;

  /// Wait for the transaction to be mined. `true` when it succeeded,
  /// `false` when it reverted; an error when no receipt arrived.
  async fn confirm_delivery(&self, tx_hash: &str) -> anyhow::Result<bool>;

  /// Recorded deposit, `None` when the contract has none or cannot say.
  async fn lookup_deposit(&self, deposit_id: B256) -> anyhow::Result<Option<DepositRecord>>;
}
