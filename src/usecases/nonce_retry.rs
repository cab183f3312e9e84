//! Nonce Retry - Bounded Resubmission on Nonce Races
//!
//! One loop, [`retry_when`], takes the classifier that decides which
//! failures are worth another attempt.
//!
//! Several submitters may share one signing key. When a node or the
//! relayer reports that the nonce was consumed ("nonce too low",
//! "already known", "replacement underpriced"), the submission is
//! repeated with a freshly read pending nonce. Any other error ends the
//! loop on the attempt that produced it.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::error::is_nonce_race;

/// Attempt bound and backoff of the nonce retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first one.
  pub max_attempts: u32,
  /// Delay before the second attempt; doubles afterwards.
  pub base_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_backoff: Duration::from_millis(300),
    }
  }
}

impl RetryPolicy {
  pub fn from_network(network: &NetworkConfig) -> Self {
    Self::new(
      network.nonce_retry_attempts,
      Duration::from_millis(network.nonce_retry_backoff_ms),
    )
  }

  pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      base_backoff,
    }
  }

  /// Delay before attempt `attempt` (1-based, so attempt 2 waits the base).
  pub fn backoff(&self, attempt: u32) -> Duration {
    if attempt <= 1 {
      return Duration::ZERO;
    }
    self.base_backoff * 2u32.saturating_pow((attempt - 2).min(16))
  }
}

/// Run `op` until it succeeds, fails with an error `is_retryable`
/// rejects, or the attempts run out. `op` receives the 1-based attempt
/// number.
pub async fn retry_when<T, C, F, Fut>(policy: RetryPolicy, label: &str, is_retryable: C, mut op: F) -> Result<T>
where
  C: Fn(&anyhow::Error) -> bool,
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let mut attempt = 1;
  loop {
    match op(attempt).await {
      Ok(value) => return Ok(value),
      Err(e) if is_retryable(&e) && attempt < policy.max_attempts => {
        let delay = policy.backoff(attempt + 1);
        warn!(label, attempt, delay_ms = delay.as_millis(), error = %e, "Retryable failure, retrying");
        sleep(delay).await;
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}

/// [`retry_when`] with nonce races as the only retryable failure.
pub async fn retry_on_nonce_race<T, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T>>,
{
  retry_when(policy, label, is_nonce_race, op).await
}

/// Submit with an explicit nonce, re-reading the pending nonce before
/// every attempt.
pub async fn submit_with_nonce_retry<T, C, R, RFut, S, SFut>(
  policy: RetryPolicy,
  label: &str,
  is_retryable: C,
  read_nonce: R,
  send: S,
) -> Result<T>
where
  C: Fn(&anyhow::Error) -> bool,
  R: Fn() -> RFut,
  RFut: Future<Output = Result<u64>>,
  S: Fn(u64) -> SFut,
  SFut: Future<Output = Result<T>>,
{
  let (read_nonce, send) = (&read_nonce, &send);
  retry_when(policy, label, is_retryable, move |attempt| async move {
    let nonce = read_nonce().await?;
    debug!(label, attempt, nonce, "Submitting");
    send(nonce).await
  })
  .await
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

  use crate::error::PackerError;

  fn fast() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_millis(1))
  }

  #[test]
  fn test_backoff_doubles() {
    let policy = RetryPolicy::new(5, Duration::from_millis(100));
    assert_eq!(policy.backoff(1), Duration::ZERO);
    assert_eq!(policy.backoff(2), Duration::from_millis(100));
    assert_eq!(policy.backoff(3), Duration::from_millis(200));
    assert_eq!(policy.backoff(4), Duration::from_millis(400));
  }

  #[tokio::test]
  async fn test_rereads_nonce_each_attempt() {
    let reads = AtomicU64::new(0);
    let sends = AtomicU32::new(0);

    let result = submit_with_nonce_retry(
      fast(),
      "test",
      is_nonce_race,
      || {
        let n = reads.fetch_add(1, Ordering::SeqCst);
        async move { Ok(10 + n) }
      },
      |nonce| {
        let attempt = sends.fetch_add(1, Ordering::SeqCst);
        async move {
          if attempt < 2 {
            Err(PackerError::Transient("nonce too low".into()).into())
          } else {
            Ok(nonce)
          }
        }
      },
    )
    .await
    .unwrap();

    assert_eq!(result, 12);
    assert_eq!(reads.load(Ordering::SeqCst), 3);
    assert_eq!(sends.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_other_errors_are_not_retried() {
    let sends = AtomicU32::new(0);
    let err = retry_on_nonce_race(fast(), "test", |_| {
      sends.fetch_add(1, Ordering::SeqCst);
      async { Err::<(), _>(anyhow::anyhow!("execution reverted: would cross")) }
    })
    .await
    .unwrap_err();

    assert!(err.to_string().contains("would cross"));
    assert_eq!(sends.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_gives_up_after_max_attempts() {
    let sends = AtomicU32::new(0);
    let err = retry_on_nonce_race(RetryPolicy::new(3, Duration::from_millis(1)), "test", |_| {
      sends.fetch_add(1, Ordering::SeqCst);
      async { Err::<(), _>(anyhow::anyhow!("already known")) }
    })
    .await
    .unwrap_err();

    assert!(is_nonce_race(&err));
    assert_eq!(sends.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_classifier_decides_what_is_retried() {
    let sends = AtomicU32::new(0);
    let busy = |e: &anyhow::Error| e.to_string().contains("busy");

    let value = retry_when(fast(), "test", busy, |attempt| {
      sends.fetch_add(1, Ordering::SeqCst);
      async move {
        if attempt < 3 {
          Err(anyhow::anyhow!("relayer busy"))
        } else {
          Ok(attempt)
        }
      }
    })
    .await
    .unwrap();
    assert_eq!(value, 3);

    let err = submit_with_nonce_retry(
      fast(),
      "test",
      busy,
      || async { Ok(1) },
      |_| async { Err::<(), _>(PackerError::Transient("nonce too low".into()).into()) },
    )
    .await
    .unwrap_err();
    assert!(is_nonce_race(&err));
    assert_eq!(sends.load(Ordering::SeqCst), 3);
  }
}
