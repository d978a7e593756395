//! tx-pipeline - transaction pipeline for proof-of-stake chain clients
//!
//! Builds, signs and broadcasts transactions for many concurrent senders:
//!
//! - **Sequence management**: TTL cache of account number / next sequence and
//!   fixed-shard per-address locking
//! - **Transaction building**: single-use factory with fee derivation and
//!   two-phase signing
//! - **Broadcasting**: submit with automatic retry on stale sequences
//! - **Batching**: sequential chunked sends with adaptive chunk sizes
//!
//! Transport, key storage and message codecs are collaborators behind traits
//! ([`rpc_manager::AccountQuerier`], [`rpc_manager::BroadcastTransport`],
//! [`wallet::KeyManager`], [`tx_builder::TxConfig`]).

pub mod broadcast;
pub mod client;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod structured_logging;
pub mod tx_builder;
pub mod types;
pub mod wallet;

#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

#[path = "sequence manager/mod.rs"]
pub mod sequence_manager;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

// Re-export commonly used types
pub use broadcast::BatchError;
pub use client::TxClient;
pub use config::ClientConfig;
pub use tx_builder::{BoxedMsg, Msg, PipelineResult, RawMsg, TxError};
pub use types::{BaseTx, BroadcastMode, ResultTx};
