//! Session Manager - Permit Bootstrap and Renewal
//!
//! Obtains a relayer session for a wallet by fetching the relayer set
//! root, reading the registry nonce right before signing, building and
//! signing a permit, and exchanging it through `session-init`. Stored
//! sessions are reused until fewer than 60 seconds remain.

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::domain::session::{build_permit, MethodSet, Session, SignedPermit};
use crate::ports::relayer::{RelayerService, SessionGrant};
use crate::ports::signer::PermitSigner;

/// Lowercased 0x-prefixed address, the key used across checkpoints.
pub fn address_key(address: Address) -> String {
  address.to_string().to_lowercase()
}

/// Outcome of [`SessionManager::ensure_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
  /// The stored session is still usable.
  Reused(Session),
  /// A new session was created.
  Created { session: Session, grant: SessionGrant },
}

impl SessionOutcome {
  pub const fn session(&self) -> &Session {
    match self {
      Self::Reused(session) | Self::Created { session, .. } => session,
    }
  }

  pub const fn is_created(&self) -> bool {
    matches!(self, Self::Created { .. })
  }
}

/// Creates and renews relayer sessions for one market.
pub struct SessionManager<R: RelayerService> {
  relayer: Arc<R>,
  order_book: Address,
  market_id: B256,
  methods: MethodSet,
  ttl_secs: u64,
}

impl<R: RelayerService> SessionManager<R> {
  pub fn new(relayer: Arc<R>, order_book: Address, market_id: B256, methods: MethodSet, ttl_secs: u64) -> Self {
    Self {
      relayer,
      order_book,
      market_id,
      methods,
      ttl_secs,
    }
  }

  /// Lifetime requested for sessions created from now on.
  pub fn set_ttl_secs(&mut self, ttl_secs: u64) {
    self.ttl_secs = ttl_secs;
  }

  /// Reuse `stored` when it has at least a minute left, else bootstrap.
  pub async fn ensure_session(
    &self,
    signer: &dyn PermitSigner,
    stored: Option<Session>,
    now: i64,
  ) -> Result<SessionOutcome> {
    if let Some(session) = stored.filter(|s| s.is_reusable_at(now)) {
      debug!(
        wallet = signer.nickname(),
        remaining_secs = session.remaining_secs(now),
        "Reusing stored session"
      );
      return Ok(SessionOutcome::Reused(session));
    }

    let (session, grant) = self.create_session(signer, now).await?;
    Ok(SessionOutcome::Created { session, grant })
  }

  /// Sign a fresh permit and exchange it for a session.
  ///
  /// The nonce is read immediately before signing; a stale nonce or a
  /// rejected signature comes back as an authorization error.
  #[instrument(skip(self, signer), fields(wallet = signer.nickname()))]
  pub async fn create_session(&self, signer: &dyn PermitSigner, now: i64) -> Result<(Session, SessionGrant)> {
    let trader = signer.address();
    let root = self
      .relayer
      .relayer_set_root()
      .await
      .context("Failed to fetch relayer set root")?;
    let nonce = self
      .relayer
      .session_nonce(trader)
      .await
      .context("Failed to fetch session nonce")?;

    let now_secs = u64::try_from(now).unwrap_or(0);
    let expiry = now_secs.saturating_add(self.ttl_secs);
    let permit = build_permit(trader, root, expiry, nonce, vec![self.market_id], self.methods);
    let signature = signer.sign_permit(&permit)?;
    let signed = SignedPermit { permit, signature };

    let grant = self.relayer.create_session(self.order_book, &signed).await?;

    let session = Session {
      wallet_address: address_key(trader),
      session_id: grant.session_id.clone(),
      expiry: i64::try_from(expiry).unwrap_or(i64::MAX),
    };
    info!(
      session_id = %session.session_id,
      expiry = session.expiry,
      nonce,
      "Session bootstrapped"
    );
    Ok((session, grant))
  }
}
