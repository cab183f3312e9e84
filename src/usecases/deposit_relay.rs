//! Deposit Relay - Idempotent Cross-chain Delivery
//!
//! Delivers `processDeposit(depositId, recipient, amount)` to the
//! destination contract with the nonce retry loop and waits for the
//! receipt. A destination that reports the deposit as already processed
//! counts as success once its recorded recipient and amount match the
//! payload; each deposit id is one logical delivery no matter how often
//! it is submitted, and an id is only marked delivered after a
//! successful receipt or a processed record.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::B256;
use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::error::{is_already_processed, is_nonce_race, PackerError};
use crate::ports::deposit::{DepositDestination, DepositPayload};

use super::nonce_retry::{submit_with_nonce_retry, RetryPolicy};

/// Result of one delivery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
  /// This call's transaction applied the deposit.
  Delivered { tx_hash: String },
  /// Someone else applied it first. `verified` is false when the
  /// destination could not report the recorded deposit.
  AlreadyProcessed { verified: bool },
  /// This relay already delivered the deposit id.
  Duplicate,
}

/// Totals over a batch of deliveries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
  pub delivered: usize,
  pub already_processed: usize,
  pub duplicates: usize,
  pub failed: usize,
}

/// Delivers deposits to one destination.
pub struct DepositRelay<D: DepositDestination> {
  destination: Arc<D>,
  policy: RetryPolicy,
  delivered: HashSet<B256>,
}

impl<D: DepositDestination> DepositRelay<D> {
  pub fn new(destination: Arc<D>, policy: RetryPolicy) -> Self {
    Self {
      destination,
      policy,
      delivered: HashSet::new(),
    }
  }

  /// Logical deposits delivered so far.
  pub fn delivered_count(&self) -> usize {
    self.delivered.len()
  }

  /// Deliver one deposit.
  ///
  /// # Errors
  /// Fails on non-retryable destination errors, on exhausted nonce
  /// retries, and with [`PackerError::DepositMismatch`] when the
  /// destination recorded different contents under the same id.
  #[instrument(skip(self, payload), fields(deposit_id = %payload.deposit_id))]
  pub async fn deliver(&mut self, payload: &DepositPayload) -> Result<DeliveryOutcome> {
    if self.delivered.contains(&payload.deposit_id) {
      debug!("Deposit already delivered by this relay");
      return Ok(DeliveryOutcome::Duplicate);
    }

    let destination = Arc::clone(&self.destination);
    let relayer = destination.relayer_address();
    let sent = submit_with_nonce_retry(
      self.policy,
      "deposit",
      is_nonce_race,
      || destination.pending_nonce(relayer),
      |nonce| destination.send_delivery(payload, nonce),
    )
    .await;

    let outcome = match sent {
      Ok(tx_hash) => self.confirm(payload, tx_hash).await?,
      Err(e) if is_already_processed(&e) => {
        let verified = self.verify_processed(payload).await?;
        info!(verified, "Deposit already processed at destination");
        DeliveryOutcome::AlreadyProcessed { verified }
      }
      Err(e) => return Err(e).context("Deposit delivery failed"),
    };

    self.delivered.insert(payload.deposit_id);
    Ok(outcome)
  }

  /// Wait for the delivery receipt.
  ///
  /// A reverted delivery still counts when the destination holds a
  /// matching record, which is how a lost race with another relayer
  /// shows up once mined.
  async fn confirm(&self, payload: &DepositPayload, tx_hash: String) -> Result<DeliveryOutcome> {
    let succeeded = self
      .destination
      .confirm_delivery(&tx_hash)
      .await
      .with_context(|| format!("Delivery {tx_hash} was not confirmed"))?;
    if succeeded {
      info!(tx_hash = %tx_hash, amount = %payload.amount, "Deposit delivered");
      return Ok(DeliveryOutcome::Delivered { tx_hash });
    }

    warn!(tx_hash = %tx_hash, "Delivery transaction reverted");
    if self.verify_processed(payload).await? {
      info!("Deposit applied by another delivery");
      return Ok(DeliveryOutcome::AlreadyProcessed { verified: true });
    }
    Err(PackerError::from_message(format!("delivery transaction {tx_hash} reverted")).into())
  }

  /// Compare the destination's record with the payload.
  async fn verify_processed(&self, payload: &DepositPayload) -> Result<bool> {
    match self.destination.lookup_deposit(payload.deposit_id).await {
      Ok(Some(record)) if record.recipient == payload.recipient && record.amount == payload.amount => Ok(true),
      Ok(Some(record)) => {
        warn!(
          recorded_recipient = %record.recipient,
          recorded_amount = %record.amount,
          "Processed deposit differs from payload"
        );
        Err(
          PackerError::DepositMismatch {
            deposit_id: payload.deposit_id.to_string(),
          }
          .into(),
        )
      }
      Ok(None) => {
        warn!("Destination reports no record for a processed deposit, accepting");
        Ok(false)
      }
      Err(e) => {
        warn!(error = %e, "Deposit lookup failed, accepting processed deposit unverified");
        Ok(false)
      }
    }
  }

  /// Deliver a batch in order; failures are logged and counted.
  pub async fn deliver_all(&mut self, payloads: &[DepositPayload]) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for payload in payloads {
      match self.deliver(payload).await {
        Ok(DeliveryOutcome::Delivered { .. }) => report.delivered += 1,
        Ok(DeliveryOutcome::AlreadyProcessed { .. }) => report.already_processed += 1,
        Ok(DeliveryOutcome::Duplicate) => report.duplicates += 1,
        Err(e) => {
          warn!(deposit_id = %payload.deposit_id, error = %format!("{e:#}"), "Deposit not delivered");
          report.failed += 1;
        }
      }
    }
    report
  }
}

/// Parse one deposit payload per non-empty line.
///
/// # Errors
/// Names the first line that is not a valid payload.
pub fn parse_payloads(text: &str) -> Result<Vec<DepositPayload>> {
  text
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(i, line)| {
      serde_json::from_str(line).with_context(|| format!("Invalid deposit payload on line {}", i + 1))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_payloads_skips_blank_lines() {
    let id = format!("0x{}", "ab".repeat(32));
    let text = format!(
      "{{\"depositId\":\"{id}\",\"recipient\":\"0x00000000000000000000000000000000000000aa\",\"amount\":\"0x3e8\"}}\n\n"
    );
    let payloads = parse_payloads(&text).unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].amount, alloy::primitives::U256::from(1000u64));
  }

  #[test]
  fn test_parse_payloads_names_bad_line() {
    let err = parse_payloads("\nnot json\n").unwrap_err();
    assert!(err.to_string().contains("line 2"));
  }
}
