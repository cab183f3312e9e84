//! Chain Adapters - On-chain Interaction Layer
//!
//! Provides on-chain access via alloy-rs 0.9 for:
//! - RPC provider management with chain id validation
//! - Order-book and collateral reads (`ChainReader`)
//! - EIP-712 session permit signing (`PermitSigner`)
//! - Cross-chain deposit delivery (`DepositDestination`)

pub mod abi;
pub mod deposit;
pub mod permit;
pub mod provider;
pub mod reader;
pub mod units;
pub mod wallet;

pub use deposit::OnChainDepositDestination;
pub use permit::{registry_domain, Eip712PermitSigner};
pub use provider::ChainProvider;
pub use reader::OrderBookReader;
pub use wallet::TradingWallet;
