//! Repository Implementation - Concrete Adapter for the Checkpoint Port
//!
//! Wraps `CheckpointStore` (atomic JSON documents) and `ActionJournal`
//! (JSONL append-only file) into a single struct that implements the
//! `CheckpointRepository` trait from `crate::ports::checkpoint`.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use super::checkpoint_store::CheckpointStore;
use super::journal::ActionJournal;
use crate::ports::checkpoint::{
    ActionRecord, Checkpoint, CheckpointRepository, MarketKey, WalletState,
};

/// File-backed checkpoint repository.
pub struct JsonCheckpointRepository {
    store: CheckpointStore,
    journal: ActionJournal,
}

impl JsonCheckpointRepository {
    pub fn new(store: CheckpointStore, journal: ActionJournal) -> Self {
        Self { store, journal }
    }

    /// Create the store and journal under `data_dir`.
    pub async fn from_data_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        let store = CheckpointStore::new(data_dir.as_ref()).await?;
        let journal = ActionJournal::new(data_dir.as_ref()).await?;
        Ok(Self::new(store, journal))
    }
}

#[async_trait]
impl CheckpointRepository for JsonCheckpointRepository {
    async fn load_checkpoint(&self, key: &MarketKey) -> Result<Option<Checkpoint>> {
        self.store.load(key).await
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.store.save(checkpoint).await
    }

    async fn save_wallet(&self, key: &MarketKey, address: &str, state: &WalletState) -> Result<()> {
        self.store.save_wallet(key, address, state).await
    }

    async fn load_wallet(&self, key: &MarketKey, address: &str) -> Result<Option<WalletState>> {
        self.store.load_wallet(key, address).await
    }

    async fn append_action(&self, record: &ActionRecord) -> Result<()> {
        self.journal.append(record).await
    }

    async fn read_actions(&self, key: &MarketKey, limit: usize) -> Result<Vec<ActionRecord>> {
        self.journal.read_last(key, limit).await
    }
}
