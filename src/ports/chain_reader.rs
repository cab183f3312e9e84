//! Chain Reader Port - Read-only Market State Interface
//!
//! Queries the order-book contract and the collateral contract. All
//! values are returned in human units; implementations own the
//! fixed-point scaling. Nothing here mutates chain state.

use async_trait::async_trait;
use alloy::primitives::Address;
use rust_decimal::Decimal;

use crate::domain::market::{OnChainOrder, TopOfBook};

/// Trait for read-only chain queries.
#[async_trait]
pub trait ChainReader: Send + Sync + 'static {
  /// Chain id reported by the node.
  async fn chain_id(&self) -> anyhow::Result<u64>;

  /// Resting orders of `trader` on `order_book`.
  ///
  /// Orders whose lookup fails or whose trader is the zero address are
  /// skipped.
  async fn user_open_orders(
    &self,
    order_book: Address,
    trader: Address,
  ) -> anyhow::Result<Vec<OnChainOrder>>;

  /// Best bid and ask; an empty side is `None`.
  async fn best_bid_ask(
    &self,
    order_book: Address,
  ) -> anyhow::Result<(Option<Decimal>, Option<Decimal>)>;

  /// Contract mark price, `None` when zero.
  async fn mark_price(&self, order_book: Address) -> anyhow::Result<Option<Decimal>>;

  /// Free collateral of `trader`.
  async fn available_collateral(&self, trader: Address) -> anyhow::Result<Decimal>;
}

/// Top of book, reading the mark price only when both sides are empty.
pub async fn read_top_of_book<R: ChainReader + ?Sized>(
  reader: &R,
  order_book: Address,
) -> anyhow::Result<TopOfBook> {
  let (best_bid, best_ask) = reader.best_bid_ask(order_book).await?;
  let mark_price = if best_bid.is_none() && best_ask.is_none() {
    reader.mark_price(order_book).await?
  } else {
    None
  };
  Ok(TopOfBook {
    best_bid,
    best_ask,
    mark_price,
  })
}
