//! Trading session model and renewal policy.
//!
//! A session is the relayer-issued handle obtained by exchanging a
//! signed permit. It is reused until fewer than
//! [`RENEWAL_MARGIN_SECS`] remain before expiry.

use std::fmt;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// A session is renewed once fewer than this many seconds remain.
pub const RENEWAL_MARGIN_SECS: i64 = 60;

/// Relayer-issued trading session for one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Lowercased wallet address.
    pub wallet_address: String,
    /// Opaque handle used for every trade submission.
    pub session_id: String,
    /// Expiry, Unix seconds.
    pub expiry: i64,
}

impl Session {
    /// Seconds left before expiry (negative once expired).
    pub const fn remaining_secs(&self, now: i64) -> i64 {
        self.expiry - now
    }

    /// Whether the session can still be used at `now` without renewal.
    pub const fn is_reusable_at(&self, now: i64) -> bool {
        self.remaining_secs(now) >= RENEWAL_MARGIN_SECS
    }
}

/// Methods a permit can authorize, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradeMethod {
    PlaceLimit,
    PlaceMarginLimit,
    PlaceMarket,
    PlaceMarginMarket,
    Modify,
    Cancel,
}

impl TradeMethod {
    pub const ALL: [Self; 6] = [
        Self::PlaceLimit,
        Self::PlaceMarginLimit,
        Self::PlaceMarket,
        Self::PlaceMarginMarket,
        Self::Modify,
        Self::Cancel,
    ];

    /// Bit position in the permit's method bitmap.
    pub const fn bit(self) -> u32 {
        match self {
            Self::PlaceLimit => 1 << 0,
            Self::PlaceMarginLimit => 1 << 1,
            Self::PlaceMarket => 1 << 2,
            Self::PlaceMarginMarket => 1 << 3,
            Self::Modify => 1 << 4,
            Self::Cancel => 1 << 5,
        }
    }

    /// Wire name used by the relayer `trade` endpoint.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlaceLimit => "place-limit",
            Self::PlaceMarginLimit => "place-margin-limit",
            Self::PlaceMarket => "place-market",
            Self::PlaceMarginMarket => "place-margin-market",
            Self::Modify => "modify",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for TradeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitmap of authorized methods carried by a permit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodSet(u32);

impl MethodSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every method the relayer exposes.
    pub fn all() -> Self {
        Self::from_methods(&TradeMethod::ALL)
    }

    pub fn from_methods(methods: &[TradeMethod]) -> Self {
        Self(methods.iter().fold(0, |acc, m| acc | m.bit()))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, method: TradeMethod) -> bool {
        self.0 & method.bit() != 0
    }

    #[must_use]
    pub const fn with(self, method: TradeMethod) -> Self {
        Self(self.0 | method.bit())
    }
}

/// Unsigned session permit.
///
/// Authorizes the relayer set identified by `relayer_set_root` to submit
/// the methods in `methods` for `trader` on `allowed_markets` until
/// `expiry`. The nonce is consumed by the session registry on use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    pub trader: Address,
    pub relayer_set_root: B256,
    /// Expiry, Unix seconds.
    pub expiry: u64,
    pub nonce: u64,
    pub allowed_markets: Vec<B256>,
    pub methods: MethodSet,
    /// Fresh random value making every permit unique.
    pub salt: B256,
}

/// Assemble a permit with a fresh random salt.
pub fn build_permit(
    trader: Address,
    relayer_set_root: B256,
    expiry: u64,
    nonce: u64,
    allowed_markets: Vec<B256>,
    methods: MethodSet,
) -> Permit {
    Permit {
        trader,
        relayer_set_root,
        expiry,
        nonce,
        allowed_markets,
        methods,
        salt: B256::from(rand::random::<[u8; 32]>()),
    }
}

/// A permit together with its EIP-712 signature (0x-prefixed hex).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPermit {
    pub permit: Permit,
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_reuse_requires_sixty_seconds() {
        let session = Session {
            wallet_address: "0xabc".into(),
            session_id: "s-1".into(),
            expiry: 1_000,
        };
        assert!(session.is_reusable_at(940));
        assert!(!session.is_reusable_at(941));
        assert!(!session.is_reusable_at(2_000));
    }

    #[test]
    fn test_method_bitmap() {
        let set = MethodSet::from_methods(&[TradeMethod::PlaceLimit, TradeMethod::Cancel]);
        assert_eq!(set.bits(), 0b10_0001);
        assert!(set.contains(TradeMethod::Cancel));
        assert!(!set.contains(TradeMethod::Modify));
        assert_eq!(MethodSet::all().bits(), 0b11_1111);
        assert!(MethodSet::empty().with(TradeMethod::Modify).contains(TradeMethod::Modify));
    }

    #[test]
    fn test_method_wire_names() {
        assert_eq!(TradeMethod::PlaceMarginMarket.to_string(), "place-margin-market");
        let json = serde_json::to_string(&TradeMethod::PlaceMarginLimit).unwrap();
        assert_eq!(json, "\"place-margin-limit\"");
    }

    #[test]
    fn test_build_permit_uses_fresh_salt() {
        let root = B256::repeat_byte(0x11);
        let market = B256::repeat_byte(0x22);
        let a = build_permit(Address::ZERO, root, 1_000, 4, vec![market], MethodSet::all());
        let b = build_permit(Address::ZERO, root, 1_000, 4, vec![market], MethodSet::all());
        assert_ne!(a.salt, b.salt);
        assert_eq!(a.nonce, 4);
        assert_eq!(a.allowed_markets, vec![market]);
    }
}
