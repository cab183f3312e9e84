//! Per-wallet collateral budgeting.
//!
//! A wallet may lock at most `available × utilization` in order margin.
//! Margin already reserved by its resting margin orders counts against
//! that cap, and every order the strategy decides to place reserves its
//! estimated margin before the next one is sized.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

use super::market::OnChainOrder;

/// Fraction of the remaining budget a scaled-down order may use.
pub const SAFETY_CUSHION: Decimal = dec!(0.9);

const BPS_DENOMINATOR: Decimal = dec!(10000);

/// Estimated margin for an order: `amount × price × bps / 10000`.
pub fn required_margin(amount: Decimal, price: Decimal, margin_bps: u32) -> Decimal {
    amount * price * Decimal::from(margin_bps) / BPS_DENOMINATOR
}

/// Outcome of fitting an order into the remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// The requested amount fits as-is.
    Fits { amount: Decimal, margin: Decimal },
    /// The amount was scaled down to fit under the cushion.
    Scaled { amount: Decimal, margin: Decimal },
    /// Scaled amount fell below the dust floor; skip the placement.
    Dust,
}

impl Sizing {
    /// Amount and margin to place, `None` for dust.
    pub const fn placement(self) -> Option<(Decimal, Decimal)> {
        match self {
            Self::Fits { amount, margin } | Self::Scaled { amount, margin } => Some((amount, margin)),
            Self::Dust => None,
        }
    }
}

/// Collateral cap and running reservation for one wallet and cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralBudget {
    cap: Decimal,
    reserved: Decimal,
}

impl CollateralBudget {
    /// Budget from available collateral and the wallet's resting orders.
    pub fn new(available: Decimal, utilization: Decimal, open_orders: &[OnChainOrder]) -> Self {
        let reserved = open_orders
            .iter()
            .filter(|o| o.is_margin_order)
            .map(|o| o.margin_required)
            .sum();
        Self {
            cap: (available * utilization).max(Decimal::ZERO),
            reserved,
        }
    }

    pub const fn cap(&self) -> Decimal {
        self.cap
    }

    pub const fn reserved(&self) -> Decimal {
        self.reserved
    }

    /// Collateral still available for new orders this cycle.
    pub fn remaining(&self) -> Decimal {
        (self.cap - self.reserved).max(Decimal::ZERO)
    }

    /// Record margin locked by an order decided this cycle.
    pub fn reserve(&mut self, margin: Decimal) {
        self.reserved += margin;
    }

    /// Fit an order of `amount` at `price` into the remaining budget.
    ///
    /// Orders that do not fit are scaled proportionally so their margin
    /// uses at most [`SAFETY_CUSHION`] of what remains, rather than being
    /// abandoned. Scaled orders below `dust` are reported as [`Sizing::Dust`].
    pub fn fit(&self, amount: Decimal, price: Decimal, margin_bps: u32, dust: Decimal) -> Sizing {
        let required = required_margin(amount, price, margin_bps);
        let remaining = self.remaining();
        if required <= remaining {
            return Sizing::Fits {
                amount,
                margin: required,
            };
        }
        if remaining <= Decimal::ZERO || required <= Decimal::ZERO {
            return Sizing::Dust;
        }

        let scaled = (amount * remaining * SAFETY_CUSHION / required)
            .round_dp_with_strategy(8, RoundingStrategy::ToZero);
        if scaled <= Decimal::ZERO || scaled < dust {
            return Sizing::Dust;
        }
        Sizing::Scaled {
            amount: scaled,
            margin: required_margin(scaled, price, margin_bps),
        }
    }
}
