//! Deposit Receiver - Destination-side Delivery Adapter
//!
//! Implements the `DepositDestination` port with a signing provider on
//! the destination chain. Nonces are set explicitly by the caller so
//! the retry combinator controls them; node errors are classified into
//! `PackerError` before they leave this module. A broadcast delivery
//! only counts once its receipt reports success.

use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::config::DepositRelayConfig;
use crate::error::PackerError;
use crate::ports::deposit::{DepositDestination, DepositPayload, DepositRecord};

use super::abi::IDepositReceiver;
use super::provider::DynProvider;
use super::wallet::TradingWallet;

/// Destination contract reached through a wallet-filled provider.
pub struct OnChainDepositDestination {
    provider: DynProvider,
    receiver: Address,
    relayer: Address,
    receipt_timeout: Duration,
}

/// Interval between receipt lookups.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

impl OnChainDepositDestination {
    /// Connect a signing provider for the delivering account.
    #[instrument(skip_all)]
    pub fn connect(config: &DepositRelayConfig, relayer: &TradingWallet) -> Result<Self> {
        let url = config.rpc_url.parse().context("Invalid deposit RPC URL")?;
        let root = ProviderBuilder::new().on_http(url).boxed();
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(relayer.signer().clone()))
            .on_provider(root);

        let receiver = config.receiver_address()?;
        info!(receiver = %receiver, relayer = %relayer.address(), "Deposit destination ready");

        Ok(Self {
            provider: Arc::new(provider),
            receiver,
            relayer: relayer.address(),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
        })
    }
}

#[async_trait]
impl DepositDestination for OnChainDepositDestination {
    fn relayer_address(&self) -> Address {
        self.relayer
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| PackerError::Transient(format!("pending nonce read failed: {e}")).into())
    }

    #[instrument(skip(self, payload), fields(deposit_id = %payload.deposit_id))]
    async fn send_delivery(&self, payload: &DepositPayload, nonce: u64) -> Result<String> {
        let receiver = IDepositReceiver::new(self.receiver, self.provider.clone());
        let pending = receiver
            .processDeposit(payload.deposit_id, payload.recipient, payload.amount)
            .nonce(nonce)
            .send()
            .await
            .map_err(|e| PackerError::from_message(e.to_string()))?;
        Ok(pending.tx_hash().to_string())
    }

    #[instrument(skip(self))]
    async fn confirm_delivery(&self, tx_hash: &str) -> Result<bool> {
        let hash: B256 = tx_hash.parse().context("Invalid delivery transaction hash")?;

        let receipt = timeout(self.receipt_timeout, async {
            loop {
                match self.provider.get_transaction_receipt(hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => debug!("Delivery not mined yet"),
                    Err(e) => warn!(error = %e, "Receipt lookup failed, polling again"),
                }
                sleep(RECEIPT_POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| {
            PackerError::Transient(format!(
                "no receipt for delivery {tx_hash} within {}s",
                self.receipt_timeout.as_secs()
            ))
        })?;

        Ok(receipt.status())
    }

    async fn lookup_deposit(&self, deposit_id: B256) -> Result<Option<DepositRecord>> {
        let receiver = IDepositReceiver::new(self.receiver, self.provider.clone());
        let record = receiver
            .processedDeposits(deposit_id)
            .call()
            .await
            .context("processedDeposits lookup failed")?;
        if !record.processed {
            return Ok(None);
        }
        Ok(Some(DepositRecord {
            recipient: record.recipient,
            amount: record.amount,
        }))
    }
}
