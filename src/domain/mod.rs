//! Domain layer - Core business logic and models.
//!
//! Pure order-book packing logic: market and session models, run
//! parameters, non-crossing pricing, collateral budgeting and the
//! decision strategies. Nothing in this ring performs I/O.

pub mod collateral;
pub mod flow;
pub mod market;
pub mod params;
pub mod pricing;
pub mod session;
pub mod strategy;

// Re-export core types for convenience
pub use collateral::{required_margin, CollateralBudget, Sizing};
pub use market::{Action, ActionKind, MarketMeta, OnChainOrder, OrderId, Side, TopOfBook};
pub use params::{RunConfig, StrategyMode};
pub use pricing::{quote_price, QuoteSkip};
pub use session::{build_permit, MethodSet, Permit, Session, SignedPermit, TradeMethod, RENEWAL_MARGIN_SECS};
pub use strategy::{decide, DecisionInput, WalletView};
