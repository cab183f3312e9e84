//! Relayer Adapter - Gasless Session and Trade Submission
//!
//! HTTP client for the relayer service implementing `RelayerService`.

pub mod client;
pub mod types;

pub use client::{RelayerClient, RelayerClientConfig};
