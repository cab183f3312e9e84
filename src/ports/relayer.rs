//! Relayer Port - Gasless Submission Interface
//!
//! The relayer pays gas on behalf of traders. It exchanges a signed
//! session permit for a session handle and then executes trade methods
//! under that session.

use async_trait::async_trait;
use alloy::primitives::{Address, B256};

use crate::domain::market::Action;
use crate::domain::session::{SignedPermit, TradeMethod};

/// Result of a successful `session-init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
  pub session_id: String,
  /// Registration transaction, when the relayer reports one.
  pub tx_hash: Option<String>,
}

/// A trade to execute under an existing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
  pub order_book: Address,
  pub session_id: String,
  pub method: TradeMethod,
  /// Decided action; the adapter encodes its parameters in chain units.
  pub action: Action,
}

/// Relayer acknowledgement of a submitted trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeReceipt {
  pub tx_hash: String,
  pub block_number: Option<u64>,
}

/// Trait for the relayer HTTP service.
///
/// Errors carry a [`crate::error::PackerError`] so callers can tell
/// authorization failures and nonce races from plain rejections.
#[async_trait]
pub trait RelayerService: Send + Sync + 'static {
  /// Merkle root of the relayer set permits must name.
  async fn relayer_set_root(&self) -> anyhow::Result<B256>;

  /// Next permit nonce for `trader` in the session registry.
  async fn session_nonce(&self, trader: Address) -> anyhow::Result<u64>;

  /// Exchange a signed permit for a session handle.
  async fn create_session(
    &self,
    order_book: Address,
    permit: &SignedPermit,
  ) -> anyhow::Result<SessionGrant>;

  /// Execute one trade method.
  async fn submit_trade(&self, request: &TradeRequest) -> anyhow::Result<TradeReceipt>;
}
