//! RPC Manager Module
//!
//! Transport traits the pipeline consumes and the classification of chain
//! responses into pipeline errors.

pub mod rpc_errors;
pub mod transport;

// Re-exports for convenience
pub use rpc_errors::{classify_tx_result, RpcError};
pub use transport::{AccountQuerier, BroadcastTransport};
