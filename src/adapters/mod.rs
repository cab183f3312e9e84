//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP, blockchain RPC, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: Order-book reads, permit signing and deposit delivery via alloy-rs
//! - `relayer`: Relayer HTTP client for sessions and trades
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: Checkpoint documents and the JSONL action journal

pub mod chain;
pub mod metrics;
pub mod persistence;
pub mod relayer;
