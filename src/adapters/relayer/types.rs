//! Relayer API Request/Response Types
//!
//! Wire shapes of the relayer HTTP service. Field names are camelCase
//! on the wire; uint256 quantities travel as decimal strings.

use serde::{Deserialize, Serialize};

use crate::domain::session::SignedPermit;

/// Response of `GET relayer-set-root`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerSetRootResponse {
  /// 0x-prefixed bytes32.
  pub root: String,
}

/// Response of `GET session-nonce`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionNonceResponse {
  /// Accepts either a JSON number or a decimal string.
  #[serde(deserialize_with = "de_u64_flexible")]
  pub nonce: u64,
}

/// Permit as serialized for `session-init`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitDto {
  pub trader: String,
  pub relayer_set_root: String,
  pub expiry: String,
  pub nonce: String,
  pub allowed_markets: Vec<String>,
  pub methods_bitmap: String,
  pub salt: String,
}

impl From<&SignedPermit> for PermitDto {
  fn from(signed: &SignedPermit) -> Self {
    let permit = &signed.permit;
    Self {
      trader: permit.trader.to_string(),
      relayer_set_root: permit.relayer_set_root.to_string(),
      expiry: permit.expiry.to_string(),
      nonce: permit.nonce.to_string(),
      allowed_markets: permit.allowed_markets.iter().map(ToString::to_string).collect(),
      methods_bitmap: permit.methods.bits().to_string(),
      salt: permit.salt.to_string(),
    }
  }
}

/// Body of `POST session-init`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInitRequest {
  pub order_book: String,
  pub permit: PermitDto,
  pub signature: String,
}

/// Response of `POST session-init`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInitResponse {
  pub session_id: String,
  #[serde(default)]
  pub tx_hash: Option<String>,
}

/// Method-specific parameters of a trade, in chain units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum TradeParams {
  Limit {
    price: String,
    amount: String,
    #[serde(rename = "isBuy")]
    is_buy: bool,
  },
  Market {
    amount: String,
    #[serde(rename = "isBuy")]
    is_buy: bool,
  },
  Modify {
    #[serde(rename = "orderId")]
    order_id: String,
    price: String,
    amount: String,
  },
  Cancel {
    #[serde(rename = "orderId")]
    order_id: String,
  },
}

/// Body of `POST trade`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequestBody {
  pub order_book: String,
  pub method: String,
  pub session_id: String,
  pub params: TradeParams,
}

/// Response of `POST trade`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
  pub tx_hash: String,
  #[serde(default)]
  pub block_number: Option<u64>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
  pub error: String,
}

fn de_u64_flexible<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Num(u64),
    Str(String),
  }

  match Raw::deserialize(deserializer)? {
    Raw::Num(n) => Ok(n),
    Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
  }
}
