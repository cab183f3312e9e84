//! Trading wallets - key loading from the environment.
//!
//! Keys are read once from the environment variable a wallet entry
//! names and kept in memory only. Neither `Debug` nor any log line ever
//! prints key material.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use tracing::info;

use crate::config::WalletConfig;
use crate::error::PackerError;

/// A wallet of the pool with its in-memory signer.
#[derive(Clone)]
pub struct TradingWallet {
    nickname: String,
    signer: PrivateKeySigner,
}

impl TradingWallet {
    /// Build a wallet from a hex private key (with or without `0x`).
    pub fn from_private_key(nickname: &str, private_key: &str) -> Result<Self> {
        let key = private_key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let key_bytes = B256::from_str(key)
            .map_err(|_| PackerError::Config(format!("wallet {nickname}: malformed private key")))?;
        let signer = PrivateKeySigner::from_bytes(&key_bytes)
            .map_err(|_| PackerError::Config(format!("wallet {nickname}: invalid private key")))?;
        Ok(Self {
            nickname: nickname.to_string(),
            signer,
        })
    }

    /// Load the key from the environment variable named by `config.key_env`.
    pub fn from_env(config: &WalletConfig) -> Result<Self> {
        let key = std::env::var(&config.key_env).map_err(|_| {
            PackerError::Config(format!(
                "wallet {}: environment variable {} is not set",
                config.nickname, config.key_env
            ))
        })?;
        let wallet = Self::from_private_key(&config.nickname, &key)?;
        info!(nickname = %wallet.nickname, address = %wallet.address(), "Loaded wallet");
        Ok(wallet)
    }

    /// Load every configured wallet, failing on the first missing key.
    pub fn load_pool(configs: &[WalletConfig]) -> Result<Vec<Self>> {
        configs.iter().map(Self::from_env).collect()
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub(crate) const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

impl fmt::Debug for TradingWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradingWallet")
            .field("nickname", &self.nickname)
            .field("address", &self.address())
            .field("signer", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (anvil/hardhat account 0).
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_address_from_key() {
        let wallet = TradingWallet::from_private_key("dev", DEV_KEY).unwrap();
        assert_eq!(
            wallet.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let wallet = TradingWallet::from_private_key("dev", DEV_KEY).unwrap();
        let rendered = format!("{wallet:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("ac0974bec39a17e36ba4a6b4d238ff944bacb478"));
    }

    #[test]
    fn test_malformed_key_is_config_error() {
        let err = TradingWallet::from_private_key("bad", "0x1234").unwrap_err();
        assert!(matches!(err.downcast_ref::<PackerError>(), Some(PackerError::Config(_))));
    }
}
