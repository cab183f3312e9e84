//! Signer Port - Permit Signing Interface
//!
//! Key material stays behind this trait. Implementations hold the
//! signing key in memory only and expose nothing but the address and
//! signatures.

use alloy::primitives::Address;

use crate::domain::session::Permit;

/// Signs session permits for one wallet.
pub trait PermitSigner: Send + Sync {
  /// Wallet address the signatures recover to.
  fn address(&self) -> Address;

  /// Human-readable wallet name for logs and the checkpoint.
  fn nickname(&self) -> &str;

  /// EIP-712 signature over `permit`, 0x-prefixed hex.
  fn sign_permit(&self, permit: &Permit) -> anyhow::Result<String>;
}
