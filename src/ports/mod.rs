//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `ChainReader`: Read-only order-book and collateral queries
//! - `RelayerService`: Gasless session creation and trade submission
//! - `PermitSigner`: EIP-712 permit signing per wallet
//! - `CheckpointRepository`: Checkpoint, wallet sidecars and journal
//! - `DepositDestination`: Cross-chain deposit delivery
//! - `PackerTelemetry`: Run counters and readiness hooks

pub mod chain_reader;
pub mod checkpoint;
pub mod deposit;
pub mod relayer;
pub mod signer;
pub mod telemetry;
