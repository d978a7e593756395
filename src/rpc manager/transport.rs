//! Transport seams to the chain node
//!
//! The wire protocol to the node is owned by whoever implements these traits.
//! Implementations are expected to carry their own request deadlines.

use super::rpc_errors::RpcError;
use crate::types::{AccountInfo, BroadcastMode, BroadcastResponse, SimulateResponse};
use async_trait::async_trait;

/// Live account lookup
#[async_trait]
pub trait AccountQuerier: Send + Sync {
    /// Fetch the current account number and next sequence for `address`
    async fn query_account(&self, address: &str) -> Result<AccountInfo, RpcError>;
}

/// Transaction submission
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Submit signed transaction bytes using `mode`
    ///
    /// A transport error is returned only when the node could not be reached or
    /// answered garbage; chain-side rejections come back inside the response.
    async fn submit(&self, tx_bytes: &[u8], mode: BroadcastMode) -> Result<BroadcastResponse, RpcError>;

    /// Execute the transaction without committing it to estimate gas
    async fn simulate(&self, tx_bytes: &[u8]) -> Result<SimulateResponse, RpcError>;
}
