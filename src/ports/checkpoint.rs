//! Checkpoint Port - Resumable State Interface
//!
//! One checkpoint document per (chain, order book) pair holds the run
//! identity, the run parameters and every wallet's session handle. An
//! append-only action journal sits next to it and is only read back to
//! reconcile `last_action_at` on resume.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::market::{ActionKind, MarketMeta};
use crate::domain::params::RunConfig;
use crate::domain::session::Session;

/// Current checkpoint document format.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Identifies the market a checkpoint and journal belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketKey {
  pub chain_id: u64,
  /// Lowercased order-book contract address.
  pub order_book: String,
}

impl MarketKey {
  pub fn new(chain_id: u64, order_book: &str) -> Self {
    Self {
      chain_id,
      order_book: order_book.to_lowercase(),
    }
  }

  /// File stem shared by the checkpoint, wallet directory and journal.
  pub fn file_stem(&self) -> String {
    format!("{}-{}", self.chain_id, self.order_book)
  }
}

impl fmt::Display for MarketKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.file_stem())
  }
}

/// Identity and timing of the run that owns the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
  pub run_id: String,
  pub started_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Per-wallet sub-state. Never contains key material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
  pub nickname: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub session_id: Option<String>,
  /// Session expiry, Unix seconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub session_expiry: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_action_at: Option<DateTime<Utc>>,
}

impl WalletState {
  /// Stored session for `address`, if both id and expiry are present.
  pub fn session(&self, address: &str) -> Option<Session> {
    match (&self.session_id, self.session_expiry) {
      (Some(id), Some(expiry)) => Some(Session {
        wallet_address: address.to_lowercase(),
        session_id: id.clone(),
        expiry,
      }),
      _ => None,
    }
  }
}

/// Durable run state for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
  pub version: u32,
  pub chain_id: u64,
  /// Lowercased order-book address.
  pub order_book: String,
  pub market: MarketMeta,
  pub run: RunInfo,
  pub config: RunConfig,
  /// Keyed by lowercased wallet address.
  #[serde(default)]
  pub wallets: BTreeMap<String, WalletState>,
}

impl Checkpoint {
  /// Fresh checkpoint for a new run.
  pub fn new(
    key: &MarketKey,
    market: MarketMeta,
    config: RunConfig,
    run_id: String,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      version: CHECKPOINT_VERSION,
      chain_id: key.chain_id,
      order_book: key.order_book.clone(),
      market,
      run: RunInfo {
        run_id,
        started_at: now,
        updated_at: now,
      },
      config,
      wallets: BTreeMap::new(),
    }
  }

  pub fn key(&self) -> MarketKey {
    MarketKey::new(self.chain_id, &self.order_book)
  }

  /// Mutable wallet entry, created on first use.
  pub fn wallet_mut(&mut self, address: &str, nickname: &str) -> &mut WalletState {
    let entry = self.wallets.entry(address.to_lowercase()).or_default();
    if entry.nickname.is_empty() {
      entry.nickname = nickname.to_string();
    }
    entry
  }

  /// Session stored for `address`, if any.
  pub fn session(&self, address: &str) -> Option<Session> {
    self
      .wallets
      .get(&address.to_lowercase())
      .and_then(|w| w.session(address))
  }

  /// Store a newly created session.
  pub fn record_session(&mut self, nickname: &str, session: &Session) {
    let wallet = self.wallet_mut(&session.wallet_address, nickname);
    wallet.session_id = Some(session.session_id.clone());
    wallet.session_expiry = Some(session.expiry);
  }

  pub fn touch(&mut self, now: DateTime<Utc>) {
    self.run.updated_at = now;
  }
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
  pub timestamp: DateTime<Utc>,
  pub run_id: String,
  pub chain_id: u64,
  pub order_book: String,
  pub market_id: String,
  /// Lowercased wallet address.
  pub trader: String,
  pub kind: ActionKind,
  pub params: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tx_hash: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Most recent journaled trade per trader. Session grants do not count.
pub fn last_action_by_trader(records: &[ActionRecord]) -> HashMap<String, DateTime<Utc>> {
  let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
  for record in records.iter().filter(|r| r.kind != ActionKind::SessionInit) {
    latest
      .entry(record.trader.to_lowercase())
      .and_modify(|at| *at = (*at).max(record.timestamp))
      .or_insert(record.timestamp);
  }
  latest
}

/// Persistence of checkpoints, wallet sidecars and the action journal.
///
/// Writes are all-or-nothing. A missing, corrupt or unreadable document
/// loads as `None` so the caller starts fresh instead of failing.
#[async_trait]
pub trait CheckpointRepository: Send + Sync + 'static {
  /// Load the checkpoint for a market.
  async fn load_checkpoint(&self, key: &MarketKey) -> anyhow::Result<Option<Checkpoint>>;

  /// Atomically replace the checkpoint for `checkpoint.key()`.
  async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> anyhow::Result<()>;

  /// Persist one wallet's sub-state as its own document.
  async fn save_wallet(
    &self,
    key: &MarketKey,
    address: &str,
    state: &WalletState,
  ) -> anyhow::Result<()>;

  /// Load one wallet's sub-state.
  async fn load_wallet(&self, key: &MarketKey, address: &str) -> anyhow::Result<Option<WalletState>>;

  /// Append one entry to the market's journal.
  async fn append_action(&self, record: &ActionRecord) -> anyhow::Result<()>;

  /// The last `limit` journal entries, oldest first.
  async fn read_actions(&self, key: &MarketKey, limit: usize) -> anyhow::Result<Vec<ActionRecord>>;
}
