//! RPC Provider - alloy-rs 0.9 Connection Management
//!
//! Manages the read-only connection to the chain hosting the order
//! book. Validates RPC connectivity and the chain id at startup and
//! exposes a shared, type-erased provider to the other chain adapters.

use std::sync::Arc;

use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{bail, Context, Result};
use tracing::{info, instrument};

use crate::config::NetworkConfig;

/// Type-erased alloy provider shared across adapters.
pub type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Shared RPC provider backed by alloy-rs 0.9.
///
/// `ProviderBuilder::new().on_http()` returns a transport-specific type;
/// it is boxed onto `BoxTransport` and stored as `dyn Provider` so the
/// adapter API stays free of filler generics.
pub struct ChainProvider {
    provider: DynProvider,
    chain_id: u64,
}

impl ChainProvider {
    /// Connect to the configured RPC endpoint and validate the chain id.
    #[instrument(skip_all)]
    pub async fn connect(config: &NetworkConfig) -> Result<Self> {
        let url = config.rpc_url.parse().context("Invalid RPC URL")?;
        let provider: DynProvider = Arc::new(ProviderBuilder::new().on_http(url).boxed());

        let chain_id = provider
            .get_chain_id()
            .await
            .context("Failed to query chain ID")?;

        if let Some(expected) = config.expected_chain_id {
            if chain_id != expected {
                bail!("Expected chain_id={expected}, RPC reports {chain_id}");
            }
        }

        info!(chain_id, "Connected to RPC");
        Ok(Self { provider, chain_id })
    }

    /// Shared handle to the type-erased provider.
    pub fn inner(&self) -> DynProvider {
        Arc::clone(&self.provider)
    }

    /// Chain id read at connect time.
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Lightweight liveness probe.
    pub async fn is_healthy(&self) -> bool {
        self.provider.get_block_number().await.is_ok()
    }
}
