//! Packer - Orchestration Loop
//!
//! Drives the wallet pool through
//! `INIT -> SESSION_BOOTSTRAP -> REHYDRATE -> STEADY_STATE -> STOPPING -> STOPPED`:
//! 1. loads or creates the checkpoint and rebuilds each wallet's last
//!    trade time from the journal,
//! 2. obtains a relayer session for every wallet lacking a usable one,
//! 3. reads every wallet's resting orders from chain,
//! 4. cycles: fresh market read, strategy per wallet, submission,
//!    journal and checkpoint after every action, then a random delay.
//!    A wallet that traded within `min_delay_ms` sits the cycle out.
//!
//! A stop request is honored between wallets and between cycles; the
//! wallet in flight always finishes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::market::{Action, ActionKind, MarketMeta, OnChainOrder, Side, TopOfBook};
use crate::domain::params::RunConfig;
use crate::domain::session::{MethodSet, Session};
use crate::domain::strategy::{decide, DecisionInput, WalletView};
use crate::error::{is_authorization, PackerError};
use crate::ports::chain_reader::{read_top_of_book, ChainReader};
use crate::ports::checkpoint::{
  last_action_by_trader, ActionRecord, Checkpoint, CheckpointRepository, MarketKey, WalletState,
};
use crate::ports::relayer::{RelayerService, TradeReceipt, TradeRequest};
use crate::ports::signer::PermitSigner;
use crate::ports::telemetry::{NoopTelemetry, PackerTelemetry};

use super::nonce_retry::{retry_on_nonce_race, RetryPolicy};
use super::session_manager::{address_key, SessionManager, SessionOutcome};

/// Journal entries read back on startup.
pub const JOURNAL_REPLAY_LIMIT: usize = 10_000;

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackerState {
  Init,
  SessionBootstrap,
  Rehydrate,
  SteadyState,
  Stopping,
  Stopped,
}

/// Run options that do not belong to the strategy parameters.
#[derive(Debug, Clone)]
pub struct PackerOptions {
  pub order_book: Address,
  /// Market id placed in every permit's allowed markets.
  pub market_id: B256,
  /// Methods requested in permits; trades outside this set are refused locally.
  pub methods: MethodSet,
  pub resume: bool,
  pub resume_with_new_config: bool,
  pub retry: RetryPolicy,
  /// Stop after this many steady-state cycles.
  pub max_cycles: Option<u64>,
}

/// Runtime view of one wallet. Holds no key material.
#[derive(Debug, Clone)]
pub struct WalletRuntime {
  pub address: Address,
  /// Lowercased address.
  pub key: String,
  pub nickname: String,
  pub session: Option<Session>,
  /// Last resting orders read from chain.
  pub open_orders: Vec<OnChainOrder>,
  /// Set after an authorization failure; the wallet sits out the run.
  pub disabled: bool,
}

/// State threaded through every phase of a run.
#[derive(Debug, Clone)]
pub struct RunContext {
  pub key: MarketKey,
  pub checkpoint: Checkpoint,
  /// Most recent action per lowercased wallet address.
  pub last_action_at: HashMap<String, DateTime<Utc>>,
  pub wallets: Vec<WalletRuntime>,
  pub cycle: u64,
}

/// Totals reported when a run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
  pub run_id: String,
  pub cycles: u64,
  pub submitted: u64,
  pub failed: u64,
  pub sessions_created: u64,
}

/// Pick the session with the later expiry and the later action time.
fn merge_wallet_state(primary: WalletState, sidecar: Option<WalletState>) -> WalletState {
  let Some(sidecar) = sidecar else {
    return primary;
  };

  let (session_id, session_expiry) = match (primary.session_expiry, sidecar.session_expiry) {
    (Some(a), Some(b)) if b > a => (sidecar.session_id.clone(), sidecar.session_expiry),
    (None, Some(_)) => (sidecar.session_id.clone(), sidecar.session_expiry),
    _ => (primary.session_id.clone(), primary.session_expiry),
  };

  WalletState {
    nickname: if primary.nickname.is_empty() {
      sidecar.nickname
    } else {
      primary.nickname
    },
    session_id,
    session_expiry,
    last_action_at: primary.last_action_at.max(sidecar.last_action_at),
  }
}

/// The orchestration loop over a wallet pool.
pub struct Packer<C: ChainReader, R: RelayerService, S: CheckpointRepository> {
  chain: Arc<C>,
  relayer: Arc<R>,
  store: Arc<S>,
  sessions: SessionManager<R>,
  signers: Vec<Arc<dyn PermitSigner>>,
  market: MarketMeta,
  config: RunConfig,
  options: PackerOptions,
  telemetry: Arc<dyn PackerTelemetry>,
  shutdown_rx: broadcast::Receiver<()>,
  state: PackerState,
  stop_requested: bool,
  summary: RunSummary,
}

impl<C: ChainReader, R: RelayerService, S: CheckpointRepository> Packer<C, R, S> {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    chain: Arc<C>,
    relayer: Arc<R>,
    store: Arc<S>,
    signers: Vec<Arc<dyn PermitSigner>>,
    market: MarketMeta,
    config: RunConfig,
    options: PackerOptions,
    shutdown_rx: broadcast::Receiver<()>,
  ) -> Self {
    let sessions = SessionManager::new(
      Arc::clone(&relayer),
      options.order_book,
      options.market_id,
      options.methods,
      config.session_ttl_secs,
    );

    Self {
      chain,
      relayer,
      store,
      sessions,
      signers,
      market,
      config,
      options,
      telemetry: Arc::new(NoopTelemetry),
      shutdown_rx,
      state: PackerState::Init,
      stop_requested: false,
      summary: RunSummary::default(),
    }
  }

  #[must_use]
  pub fn with_telemetry(mut self, telemetry: Arc<dyn PackerTelemetry>) -> Self {
    self.telemetry = telemetry;
    self
  }

  pub const fn state(&self) -> PackerState {
    self.state
  }

  /// Run parameters in effect (the stored ones after a resume that kept them).
  pub const fn config(&self) -> &RunConfig {
    &self.config
  }

  /// Run every phase until stopped or out of cycles.
  ///
  /// # Errors
  /// Fails when the checkpoint cannot be loaded or saved, or when no
  /// wallet at all obtains a session.
  #[instrument(skip(self), name = "packer_loop")]
  pub async fn run(&mut self) -> Result<RunSummary> {
    self.transition(PackerState::Init);
    let mut ctx = self.init().await?;
    self.summary.run_id = ctx.checkpoint.run.run_id.clone();

    self.transition(PackerState::SessionBootstrap);
    self.bootstrap_sessions(&mut ctx).await?;

    if !self.should_stop() {
      self.transition(PackerState::Rehydrate);
      self.rehydrate(&mut ctx).await;
    }

    if !self.should_stop() {
      self.transition(PackerState::SteadyState);
      self.telemetry.loop_running(true);
      self.steady_state(&mut ctx).await;
    }

    self.transition(PackerState::Stopping);
    self.telemetry.loop_running(false);
    ctx.checkpoint.touch(Utc::now());
    self
      .store
      .save_checkpoint(&ctx.checkpoint)
      .await
      .context("Final checkpoint save failed")?;

    self.transition(PackerState::Stopped);
    info!(
      run_id = %self.summary.run_id,
      cycles = self.summary.cycles,
      submitted = self.summary.submitted,
      failed = self.summary.failed,
      "Packer stopped"
    );
    Ok(self.summary.clone())
  }

  fn transition(&mut self, next: PackerState) {
    debug!(from = ?self.state, to = ?next, "State transition");
    self.state = next;
  }

  /// Latches once a stop was signalled or the sender went away.
  fn should_stop(&mut self) -> bool {
    if self.stop_requested {
      return true;
    }
    match self.shutdown_rx.try_recv() {
      Err(TryRecvError::Empty) => false,
      _ => {
        info!("Stop requested");
        self.stop_requested = true;
        true
      }
    }
  }

  /// Sleep for `delay`; returns true if a stop arrived first.
  async fn sleep_or_stop(&mut self, delay: Duration) -> bool {
    if self.should_stop() {
      return true;
    }
    if delay.is_zero() {
      return false;
    }
    tokio::select! {
      () = sleep(delay) => false,
      _ = self.shutdown_rx.recv() => {
        info!("Stop requested during delay");
        self.stop_requested = true;
        true
      }
    }
  }

  fn next_delay(&self) -> Duration {
    let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
    let ms = if max > min {
      rand::thread_rng().gen_range(min..=max)
    } else {
      min
    };
    Duration::from_millis(ms)
  }

  // ── INIT ──────────────────────────────────────────────

  async fn init(&mut self) -> Result<RunContext> {
    let chain_id = self.chain.chain_id().await.context("Failed to read chain id")?;
    let key = MarketKey::new(chain_id, &address_key(self.options.order_book));
    let now = Utc::now();

    let stored = if self.options.resume {
      self.store.load_checkpoint(&key).await?
    } else {
      None
    };

    let mut checkpoint = match stored {
      Some(checkpoint) => {
        let checkpoint = self.adopt_checkpoint(checkpoint);
        self.sessions.set_ttl_secs(self.config.session_ttl_secs);
        checkpoint
      }
      None => {
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, market = %key, "Starting fresh run");
        Checkpoint::new(&key, self.market.clone(), self.config.clone(), run_id, now)
      }
    };

    let mut wallets = Vec::with_capacity(self.signers.len());
    for signer in &self.signers {
      let address = signer.address();
      let wallet_key = address_key(address);
      let nickname = signer.nickname().to_string();

      let primary = checkpoint.wallet_mut(&wallet_key, &nickname).clone();
      let sidecar = if self.options.resume {
        self.store.load_wallet(&key, &wallet_key).await?
      } else {
        None
      };
      let merged = merge_wallet_state(primary, sidecar);
      let session = if self.options.resume {
        merged.session(&wallet_key)
      } else {
        None
      };
      *checkpoint.wallet_mut(&wallet_key, &nickname) = merged;

      wallets.push(WalletRuntime {
        address,
        key: wallet_key,
        nickname,
        session,
        open_orders: Vec::new(),
        disabled: false,
      });
    }

    let journal = self.store.read_actions(&key, JOURNAL_REPLAY_LIMIT).await?;
    let mut last_action_at = last_action_by_trader(&journal);
    for (address, state) in &checkpoint.wallets {
      if let Some(at) = state.last_action_at {
        last_action_at
          .entry(address.clone())
          .and_modify(|t| *t = (*t).max(at))
          .or_insert(at);
      }
    }
    debug!(entries = journal.len(), wallets = last_action_at.len(), "Journal reconciled");

    checkpoint.touch(now);
    self.store.save_checkpoint(&checkpoint).await?;

    Ok(RunContext {
      key,
      checkpoint,
      last_action_at,
      wallets,
      cycle: 0,
    })
  }

  /// Apply the resume policy to a stored checkpoint.
  fn adopt_checkpoint(&mut self, mut checkpoint: Checkpoint) -> Checkpoint {
    info!(run_id = %checkpoint.run.run_id, "Resuming run from checkpoint");

    if checkpoint.config != self.config {
      if self.options.resume_with_new_config {
        info!("Run config changed, adopting new config");
        checkpoint.config = self.config.clone();
      } else {
        warn!("Run config differs from checkpoint, keeping stored config (set resume_with_new_config to adopt)");
        self.config = checkpoint.config.clone();
      }
    }

    if checkpoint.market != self.market {
      warn!(symbol = %self.market.symbol, "Market metadata changed, using current metadata");
      checkpoint.market = self.market.clone();
    }

    checkpoint
  }

  // ── SESSION_BOOTSTRAP ─────────────────────────────────

  async fn bootstrap_sessions(&mut self, ctx: &mut RunContext) -> Result<()> {
    let now = Utc::now().timestamp();
    let mut ready = 0usize;

    for index in 0..ctx.wallets.len() {
      if self.should_stop() {
        return Ok(());
      }
      match self.refresh_session(ctx, index, now).await {
        Ok(()) => ready += 1,
        Err(e) => self.session_failed(ctx, index, &e).await,
      }
    }

    if ready == 0 && !ctx.wallets.is_empty() {
      bail!(PackerError::Authorization(
        "no wallet could obtain a relayer session".into()
      ));
    }
    info!(ready, total = ctx.wallets.len(), "Sessions bootstrapped");
    Ok(())
  }

  /// Reuse or create the session of wallet `index` and persist a new one.
  async fn refresh_session(&mut self, ctx: &mut RunContext, index: usize, now: i64) -> Result<()> {
    let signer = Arc::clone(&self.signers[index]);
    let stored = ctx.wallets[index].session.clone();

    let outcome = self.sessions.ensure_session(signer.as_ref(), stored, now).await?;
    let SessionOutcome::Created { session, grant } = outcome else {
      return Ok(());
    };

    self.telemetry.session_created();
    self.summary.sessions_created += 1;

    let wallet_key = ctx.wallets[index].key.clone();
    let nickname = ctx.wallets[index].nickname.clone();
    ctx.checkpoint.record_session(&nickname, &session);
    let state = ctx.checkpoint.wallet_mut(&wallet_key, &nickname).clone();
    self.store.save_wallet(&ctx.key, &wallet_key, &state).await?;
    ctx.wallets[index].session = Some(session.clone());

    let params = json!({ "sessionId": session.session_id, "expiry": session.expiry });
    self
      .journal(ctx, index, ActionKind::SessionInit, params, grant.tx_hash, None)
      .await
  }

  async fn session_failed(&mut self, ctx: &mut RunContext, index: usize, err: &anyhow::Error) {
    let nickname = ctx.wallets[index].nickname.clone();
    if is_authorization(err) {
      error!(wallet = %nickname, error = %err, "Session authorization failed, wallet disabled");
      ctx.wallets[index].disabled = true;
    } else {
      warn!(wallet = %nickname, error = %err, "Session bootstrap failed, will retry");
    }
    let message = format!("{err:#}");
    if let Err(e) = self
      .journal(ctx, index, ActionKind::SessionInit, Value::Null, None, Some(message))
      .await
    {
      warn!(wallet = %nickname, error = %e, "Failed to journal session failure");
    }
  }

  // ── REHYDRATE ─────────────────────────────────────────

  async fn rehydrate(&mut self, ctx: &mut RunContext) {
    for wallet in ctx.wallets.iter_mut().filter(|w| !w.disabled) {
      match self
        .chain
        .user_open_orders(self.options.order_book, wallet.address)
        .await
      {
        Ok(orders) => {
          info!(wallet = %wallet.nickname, open_orders = orders.len(), "Rehydrated open orders");
          report_open_orders(self.telemetry.as_ref(), &wallet.nickname, &orders);
          wallet.open_orders = orders;
        }
        Err(e) => warn!(wallet = %wallet.nickname, error = %e, "Failed to read open orders"),
      }
    }
  }

  // ── STEADY_STATE ──────────────────────────────────────

  async fn steady_state(&mut self, ctx: &mut RunContext) {
    loop {
      if self.options.max_cycles.is_some_and(|max| ctx.cycle >= max) {
        info!(cycles = ctx.cycle, "Cycle limit reached");
        break;
      }

      if ctx.cycle > 0 {
        let delay = self.next_delay();
        if self.sleep_or_stop(delay).await {
          break;
        }
      } else if self.should_stop() {
        break;
      }

      ctx.cycle += 1;
      let started = Instant::now();
      if let Err(e) = self.run_cycle(ctx).await {
        warn!(cycle = ctx.cycle, error = %e, "Cycle aborted");
      }
      self.telemetry.cycle_completed(started.elapsed());
      self.summary.cycles = ctx.cycle;

      if self.should_stop() {
        break;
      }
    }
  }

  #[instrument(skip(self, ctx), fields(cycle = ctx.cycle))]
  async fn run_cycle(&mut self, ctx: &mut RunContext) -> Result<()> {
    let book = read_top_of_book(self.chain.as_ref(), self.options.order_book)
      .await
      .context("Failed to read top of book")?;
    if book.is_empty() && book.mark_price.is_none() {
      warn!("Book empty and no mark price, skipping cycle");
      return Ok(());
    }

    let seed: u64 = rand::random();
    for index in 0..ctx.wallets.len() {
      if index > 0 {
        let pause = Duration::from_millis(self.config.wallet_pause_ms);
        if self.sleep_or_stop(pause).await {
          break;
        }
      } else if self.should_stop() {
        break;
      }

      if let Err(e) = self.run_wallet(ctx, index, &book, seed).await {
        warn!(wallet = %ctx.wallets[index].nickname, error = %e, "Wallet step failed");
      }
    }
    Ok(())
  }

  async fn run_wallet(&mut self, ctx: &mut RunContext, index: usize, book: &TopOfBook, seed: u64) -> Result<()> {
    if ctx.wallets[index].disabled {
      return Ok(());
    }

    let now = Utc::now();
    let nickname = ctx.wallets[index].nickname.clone();
    if let Some(last) = ctx.last_action_at.get(&ctx.wallets[index].key) {
      let elapsed_ms = now.signed_duration_since(*last).num_milliseconds();
      if elapsed_ms < i64::try_from(self.config.min_delay_ms).unwrap_or(i64::MAX) {
        debug!(wallet = %nickname, elapsed_ms, "Wallet acted recently, skipping");
        return Ok(());
      }
    }

    if let Err(e) = self.refresh_session(ctx, index, now.timestamp()).await {
      self.session_failed(ctx, index, &e).await;
      return Ok(());
    }
    let Some(session_id) = ctx.wallets[index].session.as_ref().map(|s| s.session_id.clone()) else {
      return Ok(());
    };

    let address = ctx.wallets[index].address;
    let orders = self
      .chain
      .user_open_orders(self.options.order_book, address)
      .await
      .context("Failed to read open orders")?;
    let available = self
      .chain
      .available_collateral(address)
      .await
      .context("Failed to read available collateral")?;
    report_open_orders(self.telemetry.as_ref(), &nickname, &orders);

    let actions = decide(&DecisionInput {
      book,
      wallet: WalletView {
        wallet_index: index,
        available_collateral: available,
        open_orders: &orders,
      },
      config: &self.config,
      market: &self.market,
      seed,
    });
    ctx.wallets[index].open_orders = orders;

    for action in actions {
      if let Action::Skip { reason } = &action {
        debug!(wallet = %nickname, reason = %reason, "Skip");
        continue;
      }

      let outcome = self.submit(&session_id, &action).await;
      let authorization_lost = matches!(&outcome, Err(e) if is_authorization(e));
      self.record_outcome(ctx, index, &action, outcome).await?;

      if authorization_lost {
        warn!(wallet = %nickname, "Session refused, renewing next cycle");
        ctx.wallets[index].session = None;
        break;
      }
    }
    Ok(())
  }

  /// Submit one action through the relayer, retrying nonce races.
  async fn submit(&self, session_id: &str, action: &Action) -> Result<TradeReceipt> {
    let method = action
      .trade_method()
      .context("Skip actions are never submitted")?;
    if !self.options.methods.contains(method) {
      return Err(PackerError::Rejected(format!("method {method} is not authorized by the session permit")).into());
    }

    let request = TradeRequest {
      order_book: self.options.order_book,
      session_id: session_id.to_string(),
      method,
      action: action.clone(),
    };
    retry_on_nonce_race(self.options.retry, method.as_str(), |_| {
      self.relayer.submit_trade(&request)
    })
    .await
  }

  async fn record_outcome(
    &mut self,
    ctx: &mut RunContext,
    index: usize,
    action: &Action,
    outcome: Result<TradeReceipt>,
  ) -> Result<()> {
    let kind = action.kind();
    let nickname = ctx.wallets[index].nickname.clone();
    let params = serde_json::to_value(action).unwrap_or(Value::Null);

    let (tx_hash, error) = match outcome {
      Ok(receipt) => {
        info!(wallet = %nickname, kind = %kind, tx_hash = %receipt.tx_hash, "Action submitted");
        self.telemetry.action_submitted(kind);
        self.summary.submitted += 1;
        (Some(receipt.tx_hash), None)
      }
      Err(e) => {
        warn!(wallet = %nickname, kind = %kind, error = %e, "Action failed");
        self.telemetry.action_failed(kind);
        self.summary.failed += 1;
        (None, Some(format!("{e:#}")))
      }
    };

    self.journal(ctx, index, kind, params, tx_hash, error).await
  }

  /// Append a journal entry and persist the checkpoint.
  async fn journal(
    &self,
    ctx: &mut RunContext,
    index: usize,
    kind: ActionKind,
    params: Value,
    tx_hash: Option<String>,
    error: Option<String>,
  ) -> Result<()> {
    let now = Utc::now();
    let wallet_key = ctx.wallets[index].key.clone();
    let nickname = ctx.wallets[index].nickname.clone();

    let record = ActionRecord {
      timestamp: now,
      run_id: ctx.checkpoint.run.run_id.clone(),
      chain_id: ctx.key.chain_id,
      order_book: ctx.key.order_book.clone(),
      market_id: self.market.market_id.clone(),
      trader: wallet_key.clone(),
      kind,
      params,
      tx_hash,
      error,
    };
    self.store.append_action(&record).await?;

    let wallet = ctx.checkpoint.wallet_mut(&wallet_key, &nickname);
    if kind != ActionKind::SessionInit {
      wallet.last_action_at = Some(now);
      ctx.last_action_at.insert(wallet_key, now);
    }
    ctx.checkpoint.touch(now);
    self.store.save_checkpoint(&ctx.checkpoint).await
  }
}

fn report_open_orders(telemetry: &dyn PackerTelemetry, wallet: &str, orders: &[OnChainOrder]) {
  let buys = orders.iter().filter(|o| o.side == Side::Buy).count();
  telemetry.open_orders(wallet, Side::Buy, buys);
  telemetry.open_orders(wallet, Side::Sell, orders.len() - buys);
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn state(session: Option<(&str, i64)>, last: Option<i64>) -> WalletState {
    WalletState {
      nickname: "alpha".into(),
      session_id: session.map(|(id, _)| id.to_string()),
      session_expiry: session.map(|(_, exp)| exp),
      last_action_at: last.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
    }
  }

  #[test]
  fn test_merge_prefers_later_session() {
    let merged = merge_wallet_state(
      state(Some(("old", 100)), Some(50)),
      Some(state(Some(("new", 200)), Some(10))),
    );
    assert_eq!(merged.session_id.as_deref(), Some("new"));
    assert_eq!(merged.session_expiry, Some(200));
    assert_eq!(merged.last_action_at, Some(Utc.timestamp_opt(50, 0).unwrap()));
  }

  #[test]
  fn test_merge_without_sidecar_keeps_checkpoint() {
    let primary = state(Some(("cp", 100)), None);
    assert_eq!(merge_wallet_state(primary.clone(), None), primary);
  }

  #[test]
  fn test_merge_fills_missing_session_from_sidecar() {
    let merged = merge_wallet_state(state(None, None), Some(state(Some(("side", 300)), None)));
    assert_eq!(merged.session_id.as_deref(), Some("side"));
  }
}
