//! Relay Book Packer - Library Root
//!
//! Gasless liquidity packer for on-chain order books. Re-exports all
//! modules for the binary, integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod usecases;
