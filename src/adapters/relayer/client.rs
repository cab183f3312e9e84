//! Relayer HTTP Client - Throttled Gasless Submission Client
//!
//! Wraps reqwest with a governor rate limiter, a concurrency
//! semaphore and retries for reads. Writes are sent once; the nonce
//! retry combinator in the usecases layer decides whether to resend.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::types::{
  ErrorBody, PermitDto, RelayerSetRootResponse, SessionInitRequest, SessionInitResponse,
  SessionNonceResponse, TradeParams, TradeRequestBody, TradeResponse,
};
use crate::adapters::chain::units::to_fixed;
use crate::config::NetworkConfig;
use crate::domain::market::{Action, MarketMeta};
use crate::domain::session::SignedPermit;
use crate::error::PackerError;
use crate::ports::relayer::{RelayerService, SessionGrant, TradeReceipt, TradeRequest};

/// Configuration for the relayer HTTP client.
#[derive(Debug, Clone)]
pub struct RelayerClientConfig {
  /// Base URL of the relayer service.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Requests per second admitted by the throttle.
  pub max_requests_per_second: u32,
  /// Maximum retries of a read on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
}

impl Default for RelayerClientConfig {
  fn default() -> Self {
    Self {
      base_url: "http://127.0.0.1:3000/api".to_string(),
      timeout: Duration::from_secs(10),
      max_concurrent: 4,
      max_requests_per_second: 10,
      max_retries: 3,
      retry_base_delay: Duration::from_millis(200),
    }
  }
}

impl From<&NetworkConfig> for RelayerClientConfig {
  fn from(network: &NetworkConfig) -> Self {
    Self {
      base_url: network.relayer_url.clone(),
      timeout: Duration::from_millis(network.request_timeout_ms),
      max_requests_per_second: network.max_requests_per_second,
      max_retries: network.max_retries,
      ..Self::default()
    }
  }
}

/// Rate-limited HTTP client for the relayer service.
pub struct RelayerClient {
  http: Client,
  config: RelayerClientConfig,
  semaphore: Arc<Semaphore>,
  limiter: DefaultDirectRateLimiter,
  /// Fixed-point scaling of trade parameters.
  price_decimals: u8,
  amount_decimals: u8,
}

impl RelayerClient {
  /// Create a new relayer client for `market`.
  pub fn new(config: RelayerClientConfig, market: &MarketMeta) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(4)
      .build()
      .context("Failed to build HTTP client")?;

    let per_second = NonZeroU32::new(config.max_requests_per_second).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(per_second));
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    info!(base_url = %config.base_url, rps = per_second.get(), "Relayer client ready");

    Ok(Self {
      http,
      config,
      semaphore,
      limiter,
      price_decimals: market.price_decimals,
      amount_decimals: market.amount_decimals,
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// GET with retries on 429, 5xx and network failures.
  async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
    let request = self.http.get(self.url(path)).query(query);
    let response = self.execute_with_retry(request, path).await?;
    response
      .json::<T>()
      .await
      .with_context(|| format!("Malformed relayer response for {path}"))
  }

  /// POST once; non-2xx statuses become classified errors.
  async fn post_json<B: serde::Serialize + Sync, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<std::result::Result<T, (StatusCode, String)>> {
    let _permit = self.semaphore.acquire().await.context("Semaphore closed")?;
    self.limiter.until_ready().await;

    let response = self
      .http
      .post(self.url(path))
      .json(body)
      .send()
      .await
      .map_err(|e| PackerError::Transient(format!("relayer {path} unreachable: {e}")))?;

    let status = response.status();
    if status.is_success() {
      let parsed = response
        .json::<T>()
        .await
        .with_context(|| format!("Malformed relayer response for {path}"))?;
      return Ok(Ok(parsed));
    }

    Ok(Err((status, error_message(response).await)))
  }

  async fn execute_with_retry(&self, request: RequestBuilder, path: &str) -> Result<Response> {
    let _permit = self.semaphore.acquire().await.context("Semaphore closed")?;

    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis(), path, "Retrying relayer request");
        sleep(delay).await;
      }

      self.limiter.until_ready().await;
      let req = request.try_clone().context("Failed to clone request")?;

      match req.send().await {
        Ok(response) => match response.status() {
          status if status.is_success() => return Ok(response),
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(path, "Rate limited by relayer, backing off");
            sleep(Duration::from_secs(2)).await;
            last_error = Some(PackerError::Transient("rate limited".into()));
          }
          status if status.is_server_error() => {
            warn!(status = %status, path, "Relayer server error, retrying");
            last_error = Some(PackerError::Transient(format!("relayer {status}")));
          }
          status => {
            let message = error_message(response).await;
            return Err(PackerError::Rejected(format!("relayer {status}: {message}")).into());
          }
        },
        Err(e) => {
          warn!(error = %e, attempt, path, "Relayer request failed");
          last_error = Some(PackerError::Transient(e.to_string()));
        }
      }
    }

    Err(
      last_error
        .unwrap_or_else(|| PackerError::Transient("max retries exceeded".into()))
        .into(),
    )
  }

  /// Encode the action's parameters in chain units.
  pub fn encode_params(&self, action: &Action) -> Result<TradeParams> {
    let params = match action {
      Action::PlaceLimit { side, price, amount, .. } => TradeParams::Limit {
        price: to_fixed(*price, self.price_decimals)?.to_string(),
        amount: to_fixed(*amount, self.amount_decimals)?.to_string(),
        is_buy: side.is_buy(),
      },
      Action::PlaceMarket { side, amount, .. } => TradeParams::Market {
        amount: to_fixed(*amount, self.amount_decimals)?.to_string(),
        is_buy: side.is_buy(),
      },
      Action::ModifyOldest { order_id, price, amount } => TradeParams::Modify {
        order_id: order_id.to_string(),
        price: to_fixed(*price, self.price_decimals)?.to_string(),
        amount: to_fixed(*amount, self.amount_decimals)?.to_string(),
      },
      Action::CancelOne { order_id } => TradeParams::Cancel {
        order_id: order_id.to_string(),
      },
      Action::Skip { reason } => anyhow::bail!("skip is not submittable: {reason}"),
    };
    Ok(params)
  }

  /// Check if the relayer answers.
  pub async fn health_check(&self) -> bool {
    self.relayer_set_root().await.is_ok()
  }
}

/// Best-effort extraction of `{error}` from a failed response.
async fn error_message(response: Response) -> String {
  let text = response.text().await.unwrap_or_default();
  serde_json::from_str::<ErrorBody>(&text).map_or(text, |body| body.error)
}

/// Classify a failed `session-init`.
///
/// Every client error is an authorization failure: bad signature,
/// stale nonce or relayer-set mismatch.
fn session_init_error(status: StatusCode, message: String) -> PackerError {
  if status.is_server_error() {
    PackerError::Transient(format!("session-init {status}: {message}"))
  } else {
    PackerError::Authorization(format!("session-init {status}: {message}"))
  }
}

/// Classify a failed `trade`.
fn trade_error(status: StatusCode, message: String) -> PackerError {
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
      PackerError::Authorization(format!("trade {status}: {message}"))
    }
    _ => PackerError::from_message(message),
  }
}

#[async_trait]
impl RelayerService for RelayerClient {
  #[instrument(skip(self))]
  async fn relayer_set_root(&self) -> Result<B256> {
    let resp: RelayerSetRootResponse = self.get_json("relayer-set-root", &[]).await?;
    resp
      .root
      .parse::<B256>()
      .with_context(|| format!("Invalid relayer set root {}", resp.root))
  }

  #[instrument(skip(self))]
  async fn session_nonce(&self, trader: Address) -> Result<u64> {
    let resp: SessionNonceResponse = self
      .get_json("session-nonce", &[("trader", trader.to_string())])
      .await?;
    Ok(resp.nonce)
  }

  #[instrument(skip(self, permit), fields(trader = %permit.permit.trader, nonce = permit.permit.nonce))]
  async fn create_session(&self, order_book: Address, permit: &SignedPermit) -> Result<SessionGrant> {
    let body = SessionInitRequest {
      order_book: order_book.to_string(),
      permit: PermitDto::from(permit),
      signature: permit.signature.clone(),
    };

    match self.post_json::<_, SessionInitResponse>("session-init", &body).await? {
      Ok(resp) => {
        info!(session_id = %resp.session_id, "Session created");
        Ok(SessionGrant {
          session_id: resp.session_id,
          tx_hash: resp.tx_hash,
        })
      }
      Err((status, message)) => Err(session_init_error(status, message).into()),
    }
  }

  #[instrument(skip(self, request), fields(method = %request.method))]
  async fn submit_trade(&self, request: &TradeRequest) -> Result<TradeReceipt> {
    let body = TradeRequestBody {
      order_book: request.order_book.to_string(),
      method: request.method.as_str().to_string(),
      session_id: request.session_id.clone(),
      params: self.encode_params(&request.action)?,
    };

    match self.post_json::<_, TradeResponse>("trade", &body).await? {
      Ok(resp) => {
        debug!(tx_hash = %resp.tx_hash, "Trade accepted");
        Ok(TradeReceipt {
          tx_hash: resp.tx_hash,
          block_number: resp.block_number,
        })
      }
      Err((status, message)) => Err(trade_error(status, message).into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::market::Side;
  use rust_decimal_macros::dec;

  fn market() -> MarketMeta {
    MarketMeta {
      market_id: format!("0x{}", "11".repeat(32)),
      symbol: "ETH-USD".into(),
      tick_size: dec!(0.01),
      price_decimals: 6,
      amount_decimals: 18,
      buy_margin_bps: 10_000,
      sell_margin_bps: 15_000,
    }
  }

  #[test]
  fn test_encode_limit_in_chain_units() {
    let client = RelayerClient::new(RelayerClientConfig::default(), &market()).unwrap();
    let params = client
      .encode_params(&Action::PlaceLimit {
        side: Side::Buy,
        price: dec!(98.85),
        amount: dec!(0.25),
        margin: false,
      })
      .unwrap();
    assert_eq!(
      params,
      TradeParams::Limit {
        price: "98850000".into(),
        amount: "250000000000000000".into(),
        is_buy: true,
      }
    );
  }

  #[test]
  fn test_skip_is_not_encoded() {
    let client = RelayerClient::new(RelayerClientConfig::default(), &market()).unwrap();
    assert!(client.encode_params(&Action::skip("nothing")).is_err());
  }

  #[test]
  fn test_error_classification() {
    assert!(matches!(
      session_init_error(StatusCode::BAD_REQUEST, "invalid nonce".into()),
      PackerError::Authorization(_)
    ));
    assert!(session_init_error(StatusCode::BAD_GATEWAY, "down".into()).is_transient());
    assert!(trade_error(StatusCode::BAD_REQUEST, "nonce too low".into()).is_transient());
    assert!(matches!(
      trade_error(StatusCode::BAD_REQUEST, "insufficient collateral".into()),
      PackerError::Rejected(_)
    ));
    assert!(matches!(
      trade_error(StatusCode::FORBIDDEN, "session expired".into()),
      PackerError::Authorization(_)
    ));
  }
}
