//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! packer's workflows.
//!
//! Use cases:
//! - `Packer`: Orchestration loop over the wallet pool
//! - `SessionManager`: Permit bootstrap and renewal
//! - `DepositRelay`: Idempotent cross-chain deposit delivery
//! - `nonce_retry`: Bounded resubmission on nonce races

pub mod deposit_relay;
pub mod nonce_retry;
pub mod packer;
pub mod session_manager;

pub use deposit_relay::{DeliveryOutcome, DeliveryReport, DepositRelay};
pub use nonce_retry::{retry_on_nonce_race, submit_with_nonce_retry, RetryPolicy};
pub use packer::{Packer, PackerOptions, PackerState, RunSummary};
pub use session_manager::{SessionManager, SessionOutcome};
