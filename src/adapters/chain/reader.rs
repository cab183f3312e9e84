//! Order-Book Reader - Read-only Contract Queries
//!
//! Implements the `ChainReader` port against the order-book and
//! collateral contracts through `sol!`-generated bindings. Fixed-point
//! values are scaled to `Decimal` here and nowhere else.

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::domain::market::{OnChainOrder, Side};
use crate::ports::chain_reader::ChainReader;

use super::abi::{ICollateralVault, IOrderBook};
use super::provider::DynProvider;
use super::units::{ask_from_chain, bid_from_chain, from_fixed, AMOUNT_DECIMALS, COLLATERAL_DECIMALS};

/// Read-only view of one order book and its collateral vault.
pub struct OrderBookReader {
    provider: DynProvider,
    collateral: Address,
    /// Fixed-point decimals of prices on the order book.
    price_decimals: u8,
}

impl OrderBookReader {
    pub fn new(provider: DynProvider, collateral: Address, price_decimals: u8) -> Self {
        Self {
            provider,
            collateral,
            price_decimals,
        }
    }

    async fn read_order(&self, order_book: Address, order_id: U256) -> Result<Option<OnChainOrder>> {
        let book = IOrderBook::new(order_book, self.provider.clone());
        let order = book
            .getOrder(order_id)
            .call()
            .await
            .with_context(|| format!("getOrder({order_id}) failed"))?
            .order;

        if order.trader == Address::ZERO {
            return Ok(None);
        }

        Ok(Some(OnChainOrder {
            order_id: u64::try_from(order.orderId).ok().context("Order id exceeds u64")?,
            trader: order.trader.to_string().to_lowercase(),
            price: from_fixed(order.price, self.price_decimals)?,
            amount: from_fixed(order.amount, AMOUNT_DECIMALS)?,
            side: if order.isBuy { Side::Buy } else { Side::Sell },
            timestamp: u64::try_from(order.timestamp).unwrap_or(u64::MAX),
            margin_required: from_fixed(order.marginRequired, COLLATERAL_DECIMALS)?,
            is_margin_order: order.isMarginOrder,
        }))
    }
}

#[async_trait]
impl ChainReader for OrderBookReader {
    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .context("Failed to query chain ID")
    }

    #[instrument(skip(self), fields(order_book = %order_book, trader = %trader))]
    async fn user_open_orders(&self, order_book: Address, trader: Address) -> Result<Vec<OnChainOrder>> {
        let book = IOrderBook::new(order_book, self.provider.clone());
        let ids = book
            .getUserOrders(trader)
            .call()
            .await
            .context("getUserOrders failed")?
            .orderIds;

        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read_order(order_book, id).await {
                Ok(Some(order)) => orders.push(order),
                Ok(None) => debug!(order_id = %id, "Skipping order with zero trader"),
                Err(e) => warn!(order_id = %id, error = %e, "Skipping unreadable order"),
            }
        }
        Ok(orders)
    }

    #[instrument(skip(self), fields(order_book = %order_book))]
    async fn best_bid_ask(&self, order_book: Address) -> Result<(Option<Decimal>, Option<Decimal>)> {
        let book = IOrderBook::new(order_book, self.provider.clone());
        let bid = book.bestBid().call().await.context("bestBid failed")?.price;
        let ask = book.bestAsk().call().await.context("bestAsk failed")?.price;
        Ok((
            bid_from_chain(bid, self.price_decimals)?,
            ask_from_chain(ask, self.price_decimals)?,
        ))
    }

    async fn mark_price(&self, order_book: Address) -> Result<Option<Decimal>> {
        let book = IOrderBook::new(order_book, self.provider.clone());
        let raw = book
            .calculateMarkPrice()
            .call()
            .await
            .context("calculateMarkPrice failed")?
            .price;
        bid_from_chain(raw, self.price_decimals)
    }

    #[instrument(skip(self), fields(trader = %trader))]
    async fn available_collateral(&self, trader: Address) -> Result<Decimal> {
        let vault = ICollateralVault::new(self.collateral, self.provider.clone());
        let raw = vault
            .getAvailableCollateral(trader)
            .call()
            .await
            .context("getAvailableCollateral failed")?
            .available;
        from_fixed(raw, COLLATERAL_DECIMALS)
    }
}
