//! Common types shared by the pipeline and its collaborators

use crate::tx_builder::errors::TxError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How long the client waits for confirmation of a broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Wait for mempool admission (check result)
    #[default]
    Sync,
    /// Fire and forget
    Async,
    /// Wait for block inclusion (check and deliver results)
    Commit,
}

impl fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BroadcastMode::Sync => "sync",
            BroadcastMode::Async => "async",
            BroadcastMode::Commit => "commit",
        };
        f.write_str(s)
    }
}

impl FromStr for BroadcastMode {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(BroadcastMode::Sync),
            "async" => Ok(BroadcastMode::Async),
            "commit" | "block" => Ok(BroadcastMode::Commit),
            other => Err(TxError::config(format!("unknown broadcast mode: {:?}", other))),
        }
    }
}

/// Per-call transaction descriptor supplied by module-level wrappers
///
/// Only `from` (the key name) is required; every other field falls back to
/// the client configuration when left unset. Supplying either `fee` or
/// `gas_prices` here replaces the configured fee specification as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseTx {
    pub from: String,
    #[serde(default)]
    pub password: String,
    pub gas: Option<u64>,
    pub gas_adjustment: Option<f64>,
    /// Explicit fee, e.g. `4000uiris`
    pub fee: Option<String>,
    /// Gas prices, e.g. `0.025uiris`
    pub gas_prices: Option<String>,
    pub mode: Option<BroadcastMode>,
    #[serde(default)]
    pub memo: String,
    /// Estimate gas through simulation before the real broadcast
    #[serde(default)]
    pub simulate_and_execute: bool,
}

impl BaseTx {
    pub fn new(from: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: BroadcastMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    pub fn with_fee(mut self, fee: impl Into<String>) -> Self {
        self.fee = Some(fee.into());
        self
    }

    pub fn with_gas_prices(mut self, gas_prices: impl Into<String>) -> Self {
        self.gas_prices = Some(gas_prices.into());
        self
    }

    pub fn with_simulation(mut self, gas_adjustment: f64) -> Self {
        self.simulate_and_execute = true;
        self.gas_adjustment = Some(gas_adjustment);
        self
    }
}

/// Account data returned by a live account query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_number: u64,
    /// Next sequence the chain expects
    pub sequence: u64,
}

/// Execution result of one ABCI phase (check or deliver)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxExecResult {
    pub code: u32,
    #[serde(default)]
    pub codespace: String,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub gas_wanted: u64,
    #[serde(default)]
    pub gas_used: u64,
}

impl TxExecResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Raw answer of the broadcast transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub hash: String,
    #[serde(default)]
    pub height: u64,
    pub check: Option<TxExecResult>,
    pub deliver: Option<TxExecResult>,
}

/// Answer of a gas simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub gas_used: u64,
}

/// Outcome of a successful send, returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultTx {
    pub hash: String,
    pub height: u64,
    pub gas_wanted: u64,
    pub gas_used: u64,
    /// Sequence the transaction was signed with
    pub sequence: u64,
    /// Number of messages carried by the transaction
    pub msg_count: usize,
    pub mode: BroadcastMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_mode_parse() {
        assert_eq!("sync".parse::<BroadcastMode>().unwrap(), BroadcastMode::Sync);
        assert_eq!("ASYNC".parse::<BroadcastMode>().unwrap(), BroadcastMode::Async);
        assert_eq!("block".parse::<BroadcastMode>().unwrap(), BroadcastMode::Commit);

        let err = "eventually".parse::<BroadcastMode>().unwrap_err();
        assert!(matches!(err, TxError::Config(_)));
    }

    #[test]
    fn test_broadcast_mode_serde() {
        let json = serde_json::to_string(&BroadcastMode::Commit).unwrap();
        assert_eq!(json, "\"commit\"");
        let mode: BroadcastMode = serde_json::from_str("\"async\"").unwrap();
        assert_eq!(mode, BroadcastMode::Async);
    }

    #[test]
    fn test_base_tx_builder() {
        let base = BaseTx::new("alice", "pw")
            .with_mode(BroadcastMode::Commit)
            .with_memo("hello")
            .with_simulation(1.3);
        assert_eq!(base.from, "alice");
        assert_eq!(base.mode, Some(BroadcastMode::Commit));
        assert!(base.simulate_and_execute);
        assert_eq!(base.gas_adjustment, Some(1.3));
    }
}
