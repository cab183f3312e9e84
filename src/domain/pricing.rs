//! Non-crossing price selection.
//!
//! Prices are drawn at a tick distance from a reference price and then
//! clamped hard against the live top of book so that a buy never reaches
//! the best ask and a sell never reaches the best bid. Draws are a pure
//! function of (wallet index, order level, salt) so that a re-run with
//! the same inputs quotes the same prices.

use std::fmt;

use rust_decimal::prelude::*;

use super::market::{Side, TopOfBook};
use super::params::RunConfig;

/// Reason a price could not be produced for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSkip {
    /// Book is empty and no mark price is available.
    NoReference,
    /// Clamping pushed the price to zero or below.
    NonPositive,
    /// Clamping could not keep the price off the opposite best.
    WouldCross,
}

impl fmt::Display for QuoteSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoReference => write!(f, "no reference price"),
            Self::NonPositive => write!(f, "clamped price is not positive"),
            Self::WouldCross => write!(f, "price would cross the book"),
        }
    }
}

/// Stateless 64-bit mixer (splitmix64 finalizer).
pub const fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Deterministic draw for a (wallet, level, salt) triple.
pub const fn draw(wallet_index: usize, level: u32, salt: u64) -> u64 {
    let seed = mix64(wallet_index as u64) ^ mix64(((level as u64) << 32) | 0x5EED);
    mix64(seed ^ salt.rotate_left(17))
}

/// Tick distance from the reference price for one order level.
///
/// Depends only on the wallet index and level, so a restarted run
/// places the same ladder.
pub const fn tick_distance(config: &RunConfig, wallet_index: usize, side: Side, level: u32) -> u32 {
    let span = (config.max_distance_ticks - config.min_distance_ticks) as u64 + 1;
    let side_salt = if side.is_buy() { 0xB1D } else { 0xA5C };
    config.min_distance_ticks + (draw(wallet_index, level, side_salt) % span) as u32
}

/// Buffer, in ticks, kept between a new order and the opposite best.
pub fn crossing_buffer_ticks(min_distance_ticks: u32) -> u32 {
    (min_distance_ticks / 4).max(2)
}

/// Round to the nearest tick (half away from zero).
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    (price / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * tick
}

fn floor_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    (price / tick).floor() * tick
}

fn ceil_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    (price / tick).ceil() * tick
}

/// Produce a resting price `distance_ticks` away from the book.
///
/// The reference is the same-side best when it exists (so the order
/// joins the ladder behind the current best), otherwise the mid or the
/// mark price. The result is then clamped:
/// - a buy stays at least `buffer_ticks` below the best ask and never
///   above the best bid,
/// - a sell stays at least `buffer_ticks` above the best bid and never
///   below the best ask.
///
/// # Errors
/// Returns the reason the slot must be skipped this cycle.
pub fn quote_price(
    side: Side,
    book: &TopOfBook,
    tick: Decimal,
    distance_ticks: u32,
    buffer_ticks: u32,
) -> Result<Decimal, QuoteSkip> {
    let reference = book.best(side).or_else(|| book.mid()).ok_or(QuoteSkip::NoReference)?;
    let distance = tick * Decimal::from(distance_ticks);
    let buffer = tick * Decimal::from(buffer_ticks);

    let price = match side {
        Side::Buy => {
            let mut price = round_to_tick(reference - distance, tick);
            if let Some(ask) = book.best_ask {
                price = price.min(ask - buffer);
            }
            if let Some(bid) = book.best_bid {
                price = price.min(bid);
            }
            floor_to_tick(price, tick)
        }
        Side::Sell => {
            let mut price = round_to_tick(reference + distance, tick);
            if let Some(bid) = book.best_bid {
                price = price.max(bid + buffer);
            }
            if let Some(ask) = book.best_ask {
                price = price.max(ask);
            }
            ceil_to_tick(price, tick)
        }
    };

    if price <= Decimal::ZERO {
        return Err(QuoteSkip::NonPositive);
    }
    let crosses = match side {
        Side::Buy => book.best_ask.is_some_and(|ask| price >= ask),
        Side::Sell => book.best_bid.is_some_and(|bid| price <= bid),
    };
    if crosses {
        return Err(QuoteSkip::WouldCross);
    }
    Ok(price)
}

/// Draw an order amount in `[size_min, size_max]`.
///
/// The cycle `seed` makes each cycle's draw fresh while keeping it
/// reproducible.
pub fn draw_size(config: &RunConfig, wallet_index: usize, level: u32, seed: u64) -> Decimal {
    let span = config.size_max - config.size_min;
    let fraction = Decimal::from(draw(wallet_index, level, seed ^ 0x512E) % 10_001) / Decimal::from(10_000);
    (config.size_min + span * fraction)
        .round_dp_with_strategy(8, RoundingStrategy::ToZero)
        .max(config.size_min)
}
