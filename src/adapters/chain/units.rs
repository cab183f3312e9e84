//! Fixed-point conversion between chain integers and `Decimal`.
//!
//! Prices use the market's price decimals, amounts 18 decimals and
//! collateral 6 decimals. Values are never mixed without passing through
//! these helpers.

use alloy::primitives::U256;
use anyhow::{bail, Context, Result};
use rust_decimal::prelude::*;

/// Decimals of the collateral token.
pub const COLLATERAL_DECIMALS: u8 = 6;

/// Decimals of order amounts.
pub const AMOUNT_DECIMALS: u8 = 18;

/// Scale a chain integer down to a `Decimal`.
///
/// # Errors
/// Fails when the value does not fit a `Decimal` at this scale.
pub fn from_fixed(value: U256, decimals: u8) -> Result<Decimal> {
    let raw = u128::try_from(value)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .context("Fixed-point value exceeds i128")?;
    Decimal::try_from_i128_with_scale(raw, u32::from(decimals))
        .with_context(|| format!("Fixed-point value {value} does not fit at {decimals} decimals"))
}

/// Scale a `Decimal` up to a chain integer, truncating extra precision.
///
/// # Errors
/// Fails on negative input or on overflow.
pub fn to_fixed(value: Decimal, decimals: u8) -> Result<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        bail!("Negative value {value} cannot be encoded");
    }
    let truncated = value.round_dp_with_strategy(u32::from(decimals), RoundingStrategy::ToZero);
    let mantissa = u128::try_from(truncated.mantissa()).context("Mantissa out of range")?;
    let shift = u32::from(decimals) - truncated.scale();
    let factor = U256::from(10u8)
        .checked_pow(U256::from(shift))
        .context("Scale factor overflow")?;
    U256::from(mantissa)
        .checked_mul(factor)
        .context("Fixed-point overflow")
}

/// A zero bid means "no bid".
pub fn bid_from_chain(raw: U256, decimals: u8) -> Result<Option<Decimal>> {
    if raw.is_zero() {
        return Ok(None);
    }
    from_fixed(raw, decimals).map(Some)
}

/// A zero or `uint256.max` ask means "no ask".
pub fn ask_from_chain(raw: U256, decimals: u8) -> Result<Option<Decimal>> {
    if raw.is_zero() || raw == U256::MAX {
        return Ok(None);
    }
    from_fixed(raw, decimals).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_conversion() {
        let raw = U256::from(99_500_000u64);
        assert_eq!(from_fixed(raw, 6).unwrap(), dec!(99.5));
        assert_eq!(to_fixed(dec!(99.5), 6).unwrap(), raw);
    }

    #[test]
    fn test_amount_truncates_excess_precision() {
        let raw = to_fixed(dec!(0.1234567890123456789), AMOUNT_DECIMALS).unwrap();
        assert_eq!(raw, U256::from(123_456_789_012_345_678u64));
    }

    #[test]
    fn test_empty_sides() {
        assert_eq!(bid_from_chain(U256::ZERO, 6).unwrap(), None);
        assert_eq!(ask_from_chain(U256::MAX, 6).unwrap(), None);
        assert_eq!(ask_from_chain(U256::ZERO, 6).unwrap(), None);
        assert_eq!(ask_from_chain(U256::from(101_000_000u64), 6).unwrap(), Some(dec!(101)));
    }

    #[test]
    fn test_negative_rejected() {
        assert!(to_fixed(dec!(-1), 6).is_err());
    }
}
