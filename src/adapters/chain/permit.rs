//! EIP-712 session permit signing.
//!
//! The typed struct mirrors the session registry's
//! `SessionPermit(address trader,bytes32 relayerSetRoot,uint256 expiry,
//! uint256 nonce,bytes32[] allowedMarkets,uint256 methodsBitmap,bytes32 salt)`
//! and is signed over the domain
//! `{name, version, chainId, verifyingContract = registry}`.

use std::borrow::Cow;

use alloy::primitives::{Address, U256};
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use anyhow::Result;
use tracing::debug;

use crate::domain::session::Permit;
use crate::error::PackerError;
use crate::ports::signer::PermitSigner;

use super::wallet::TradingWallet;

sol! {
    struct SessionPermit {
        address trader;
        bytes32 relayerSetRoot;
        uint256 expiry;
        uint256 nonce;
        bytes32[] allowedMarkets;
        uint256 methodsBitmap;
        bytes32 salt;
    }
}

impl From<&Permit> for SessionPermit {
    fn from(permit: &Permit) -> Self {
        Self {
            trader: permit.trader,
            relayerSetRoot: permit.relayer_set_root,
            expiry: U256::from(permit.expiry),
            nonce: U256::from(permit.nonce),
            allowedMarkets: permit.allowed_markets.clone(),
            methodsBitmap: U256::from(permit.methods.bits()),
            salt: permit.salt,
        }
    }
}

/// EIP-712 domain of the session registry.
pub fn registry_domain(name: &str, version: &str, chain_id: u64, registry: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Owned(name.to_string())),
        Some(Cow::Owned(version.to_string())),
        Some(U256::from(chain_id)),
        Some(registry),
        None,
    )
}

/// Sign `permit` for `wallet` under `domain`; returns 0x-prefixed hex.
///
/// # Errors
/// A signer failure or a permit naming another trader surfaces as
/// [`PackerError::Authorization`].
pub fn sign_permit(wallet: &TradingWallet, domain: &Eip712Domain, permit: &Permit) -> Result<String> {
    if permit.trader != wallet.address() {
        return Err(PackerError::Authorization(format!(
            "permit trader {} does not match wallet {}",
            permit.trader,
            wallet.nickname()
        ))
        .into());
    }

    let typed = SessionPermit::from(permit);
    let hash = typed.eip712_signing_hash(domain);
    let signature = wallet
        .signer()
        .sign_hash_sync(&hash)
        .map_err(|e| PackerError::Authorization(format!("signing failed: {e}")))?;

    debug!(trader = %permit.trader, nonce = permit.nonce, "Signed session permit");
    Ok(alloy::hex::encode_prefixed(signature.as_bytes()))
}

/// A wallet bound to the registry domain.
pub struct Eip712PermitSigner {
    wallet: TradingWallet,
    domain: Eip712Domain,
}

impl Eip712PermitSigner {
    pub const fn new(wallet: TradingWallet, domain: Eip712Domain) -> Self {
        Self { wallet, domain }
    }
}

impl PermitSigner for Eip712PermitSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn nickname(&self) -> &str {
        self.wallet.nickname()
    }

    fn sign_permit(&self, permit: &Permit) -> Result<String> {
        sign_permit(&self.wallet, &self.domain, permit)
    }
}
