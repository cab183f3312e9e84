//! Persistence Adapters - JSON and JSONL File Storage
//!
//! Implements the checkpoint port using atomic JSON documents for
//! checkpoints and wallet sidecars and an append-only JSONL journal for
//! actions. No database dependency.

pub mod checkpoint_store;
pub mod journal;
pub mod repository_impl;

pub use checkpoint_store::CheckpointStore;
pub use journal::ActionJournal;
pub use repository_impl::JsonCheckpointRepository;
