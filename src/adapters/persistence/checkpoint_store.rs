//! Checkpoint Store - Atomic JSON Checkpoint Persistence
//!
//! One document per market at `checkpoints/{chainId}-{orderBook}.json`
//! plus one sidecar per wallet at
//! `checkpoints/{chainId}-{orderBook}/wallets/{address}.json`.
//!
//! Every write goes to a uniquely named temp file in the target
//! directory, is flushed to disk, then renamed over the target. Readers
//! therefore see either the previous or the new document, never a torn
//! one. Unreadable documents load as `None`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::ports::checkpoint::{Checkpoint, MarketKey, WalletState, CHECKPOINT_VERSION};

/// Atomic JSON store for checkpoints and wallet sidecars.
pub struct CheckpointStore {
    /// `{data_dir}/checkpoints`.
    checkpoints_dir: PathBuf,
}

impl CheckpointStore {
    /// Create a store rooted at `data_dir`, creating directories on demand.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let checkpoints_dir = data_dir.as_ref().join("checkpoints");
        fs::create_dir_all(&checkpoints_dir)
            .await
            .context("Failed to create checkpoints directory")?;
        Ok(Self { checkpoints_dir })
    }

    /// Path of the checkpoint document for `key`.
    pub fn checkpoint_path(&self, key: &MarketKey) -> PathBuf {
        self.checkpoints_dir.join(format!("{}.json", key.file_stem()))
    }

    /// Path of one wallet's sidecar document.
    pub fn wallet_path(&self, key: &MarketKey, address: &str) -> PathBuf {
        self.checkpoints_dir
            .join(key.file_stem())
            .join("wallets")
            .join(format!("{}.json", address.to_lowercase()))
    }

    /// Atomically replace the checkpoint document.
    #[instrument(skip(self, checkpoint), fields(market = %checkpoint.key()))]
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.checkpoint_path(&checkpoint.key());
        write_json_atomic(&path, checkpoint).await?;
        debug!(
            path = %path.display(),
            wallets = checkpoint.wallets.len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load the checkpoint for `key`.
    ///
    /// Missing, unreadable, corrupt or foreign-version documents all
    /// return `None` so the caller starts a fresh run.
    #[instrument(skip(self), fields(market = %key))]
    pub async fn load(&self, key: &MarketKey) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path(key);
        let Some(checkpoint) = read_json::<Checkpoint>(&path).await else {
            return Ok(None);
        };

        if checkpoint.version != CHECKPOINT_VERSION {
            warn!(
                path = %path.display(),
                version = checkpoint.version,
                expected = CHECKPOINT_VERSION,
                "Unsupported checkpoint version, starting fresh"
            );
            return Ok(None);
        }

        info!(
            run_id = %checkpoint.run.run_id,
            wallets = checkpoint.wallets.len(),
            "Checkpoint loaded"
        );
        Ok(Some(checkpoint))
    }

    /// Atomically replace one wallet's sidecar.
    #[instrument(skip(self, state), fields(market = %key))]
    pub async fn save_wallet(&self, key: &MarketKey, address: &str, state: &WalletState) -> Result<()> {
        write_json_atomic(&self.wallet_path(key, address), state).await
    }

    /// Load one wallet's sidecar, `None` when absent or unreadable.
    pub async fn load_wallet(&self, key: &MarketKey, address: &str) -> Result<Option<WalletState>> {
        Ok(read_json(&self.wallet_path(key, address)).await)
    }
}

/// Serialize `value` and write it to `path` with temp-file + rename.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .context("Checkpoint path has no parent directory")?;
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let json = serde_json::to_vec_pretty(value).context("Failed to serialize document")?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Checkpoint path has no file name")?;
    let tmp_path = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let written = async {
        let mut file = File::create(&tmp_path)
            .await
            .context("Failed to create temp file")?;
        file.write_all(&json).await.context("Failed to write temp file")?;
        file.sync_all().await.context("Failed to sync temp file")?;
        drop(file);
        fs::rename(&tmp_path, path)
            .await
            .context("Failed to rename temp file")
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    written
}

/// Read and parse a JSON document; any failure is logged and yields `None`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No document found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable document, ignoring");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt document, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::MarketMeta;
    use crate::domain::params::RunConfig;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn checkpoint(key: &MarketKey) -> Checkpoint {
        let market = MarketMeta {
            market_id: format!("0x{}", "01".repeat(32)),
            symbol: "ETH-USD".into(),
            tick_size: dec!(0.01),
            price_decimals: 6,
            amount_decimals: 18,
            buy_margin_bps: 10_000,
            sell_margin_bps: 15_000,
        };
        Checkpoint::new(key, market, RunConfig::default(), "run-a".into(), Utc::now())
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).await.unwrap();
        let key = MarketKey::new(31337, "0xBEEF");

        assert!(store.load(&key).await.unwrap().is_none());

        let cp = checkpoint(&key);
        store.save(&cp).await.unwrap();
        assert!(dir.path().join("checkpoints/31337-0xbeef.json").exists());
        assert_eq!(store.load(&key).await.unwrap(), Some(cp));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).await.unwrap();
        let key = MarketKey::new(1, "0xbook");

        fs::write(store.checkpoint_path(&key), b"{\"version\": 1, \"chain_")
            .await
            .unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stray_temp_file_leaves_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).await.unwrap();
        let key = MarketKey::new(1, "0xbook");
        let cp = checkpoint(&key);
        store.save(&cp).await.unwrap();

        // Crash between temp write and rename.
        let stray = dir.path().join("checkpoints/.1-0xbook.json.dead.tmp");
        fs::write(&stray, b"{\"version\": 1").await.unwrap();

        assert_eq!(store.load(&key).await.unwrap(), Some(cp));
    }

    #[tokio::test]
    async fn test_wallet_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).await.unwrap();
        let key = MarketKey::new(1, "0xbook");
        let state = WalletState {
            nickname: "w1".into(),
            session_id: Some("s".into()),
            session_expiry: Some(99),
            last_action_at: None,
        };

        store.save_wallet(&key, "0xABC", &state).await.unwrap();
        assert!(dir.path().join("checkpoints/1-0xbook/wallets/0xabc.json").exists());
        assert_eq!(store.load_wallet(&key, "0xabc").await.unwrap(), Some(state));
    }
}
