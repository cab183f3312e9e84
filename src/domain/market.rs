//! Core order-book domain types.
//!
//! Defines the market metadata, the ephemeral view of on-chain orders,
//! the top-of-book snapshot and the action union emitted by the
//! decision strategy. Every quantity is a `Decimal` in human units; the
//! fixed-point scaling to chain units lives in the chain adapter.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::session::TradeMethod;

/// On-chain order identifier.
pub type OrderId = u64;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub const fn is_buy(self) -> bool {
        matches!(self, Self::Buy)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Static description of the traded market.
///
/// Served by the metadata web application in production; the packer
/// receives it through configuration and copies it into the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMeta {
    /// Market identifier (bytes32, 0x-prefixed hex).
    pub market_id: String,
    /// Human-readable symbol, e.g. `ETH-USD`.
    pub symbol: String,
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Fixed-point decimals of prices on the order-book contract.
    #[serde(default = "default_price_decimals")]
    pub price_decimals: u8,
    /// Fixed-point decimals of order amounts.
    #[serde(default = "default_amount_decimals")]
    pub amount_decimals: u8,
    /// Margin rate for buys, in basis points of notional.
    #[serde(default = "default_buy_margin_bps")]
    pub buy_margin_bps: u32,
    /// Margin rate for sells, in basis points of notional.
    #[serde(default = "default_sell_margin_bps")]
    pub sell_margin_bps: u32,
}

impl MarketMeta {
    /// Margin rate for the given side.
    pub const fn margin_bps(&self, side: Side) -> u32 {
        match side {
            Side::Buy => self.buy_margin_bps,
            Side::Sell => self.sell_margin_bps,
        }
    }
}

fn default_price_decimals() -> u8 {
    6
}

fn default_amount_decimals() -> u8 {
    18
}

fn default_buy_margin_bps() -> u32 {
    10_000
}

fn default_sell_margin_bps() -> u32 {
    15_000
}

/// A resting order as read from the order-book contract.
///
/// Ephemeral: re-read every cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainOrder {
    pub order_id: OrderId,
    /// Lowercased 0x-prefixed trader address.
    pub trader: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub side: Side,
    /// Placement time, Unix seconds.
    pub timestamp: u64,
    /// Collateral reserved by the contract for this order.
    pub margin_required: Decimal,
    pub is_margin_order: bool,
}

/// Best bid/ask snapshot with an optional mark price fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    /// Reference price used when the book has no resting orders.
    pub mark_price: Option<Decimal>,
}

impl TopOfBook {
    /// Mid price, falling back to whichever side exists, then to the mark.
    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / dec!(2)),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => self.mark_price.filter(|p| *p > Decimal::ZERO),
        }
    }

    /// True when neither side of the book has a resting order.
    pub const fn is_empty(&self) -> bool {
        self.best_bid.is_none() && self.best_ask.is_none()
    }

    /// Best price on the given side.
    pub const fn best(&self, side: Side) -> Option<Decimal> {
        match side {
            Side::Buy => self.best_bid,
            Side::Sell => self.best_ask,
        }
    }
}

/// Discriminant of an [`Action`], used for journaling and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Skip,
    PlaceLimit,
    PlaceMarket,
    ModifyOldest,
    CancelOne,
    /// Session bootstrap; journaled by the orchestrator, never decided.
    SessionInit,
}

impl ActionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "SKIP",
            Self::PlaceLimit => "PLACE_LIMIT",
            Self::PlaceMarket => "PLACE_MARKET",
            Self::ModifyOldest => "MODIFY_OLDEST",
            Self::CancelOne => "CANCEL_ONE",
            Self::SessionInit => "SESSION_INIT",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single decision of the strategy for one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Nothing to do for this slot.
    Skip { reason: String },
    /// Rest a limit order on the book.
    PlaceLimit {
        side: Side,
        price: Decimal,
        amount: Decimal,
        margin: bool,
    },
    /// Cross the spread at market.
    PlaceMarket {
        side: Side,
        amount: Decimal,
        margin: bool,
    },
    /// Re-price the wallet's oldest resting order.
    ModifyOldest {
        order_id: OrderId,
        price: Decimal,
        amount: Decimal,
    },
    /// Cancel one resting order.
    CancelOne { order_id: OrderId },
}

impl Action {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }

    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Skip { .. } => ActionKind::Skip,
            Self::PlaceLimit { .. } => ActionKind::PlaceLimit,
            Self::PlaceMarket { .. } => ActionKind::PlaceMarket,
            Self::ModifyOldest { .. } => ActionKind::ModifyOldest,
            Self::CancelOne { .. } => ActionKind::CancelOne,
        }
    }

    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    /// Relayer method that executes this action, `None` for `Skip`.
    pub const fn trade_method(&self) -> Option<TradeMethod> {
        match self {
            Self::Skip { .. } => None,
            Self::PlaceLimit { margin: true, .. } => Some(TradeMethod::PlaceMarginLimit),
            Self::PlaceLimit { margin: false, .. } => Some(TradeMethod::PlaceLimit),
            Self::PlaceMarket { margin: true, .. } => Some(TradeMethod::PlaceMarginMarket),
            Self::PlaceMarket { margin: false, .. } => Some(TradeMethod::PlaceMarket),
            Self::ModifyOldest { .. } => Some(TradeMethod::Modify),
            Self::CancelOne { .. } => Some(TradeMethod::Cancel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_price_two_sided() {
        let book = TopOfBook {
            best_bid: Some(dec!(99)),
            best_ask: Some(dec!(101)),
            mark_price: None,
        };
        assert_eq!(book.mid(), Some(dec!(100)));
        assert!(!book.is_empty());
    }

    #[test]
    fn test_mid_price_falls_back_to_mark() {
        let book = TopOfBook {
            best_bid: None,
            best_ask: None,
            mark_price: Some(dec!(2500)),
        };
        assert_eq!(book.mid(), Some(dec!(2500)));
        assert!(book.is_empty());

        let no_mark = TopOfBook::default();
        assert_eq!(no_mark.mid(), None);
    }

    #[test]
    fn test_action_serializes_with_kind_tag() {
        let action = Action::CancelOne { order_id: 42 };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "CANCEL_ONE");
        assert_eq!(json["order_id"], 42);
    }

    #[test]
    fn test_trade_method_mapping() {
        let limit = Action::PlaceLimit {
            side: Side::Buy,
            price: dec!(1),
            amount: dec!(1),
            margin: true,
        };
        assert_eq!(limit.trade_method(), Some(TradeMethod::PlaceMarginLimit));
        assert_eq!(Action::skip("idle").trade_method(), None);
    }
}
