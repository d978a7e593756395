//! RPC-layer errors and chain result classification
//!
//! Transports report their own failures as [`RpcError`]. Chain-side execution
//! results (check/deliver) are mapped onto the pipeline taxonomy by
//! [`classify_tx_result`]; this is the only place that knows which result
//! codes mean "stale sequence" or "transaction too large".

use crate::tx_builder::errors::TxError;
use crate::types::TxExecResult;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Codespace of errors raised by the base SDK modules
pub const SDK_CODESPACE: &str = "sdk";

/// `ErrTxTooLarge`
pub const CODE_TX_TOO_LARGE: u32 = 21;

/// `ErrWrongSequence`
pub const CODE_WRONG_SEQUENCE: u32 = 32;

static SEQUENCE_MISMATCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)account sequence mismatch,?\s*expected\s+(\d+),?\s*got\s+(\d+)")
        .expect("sequence mismatch pattern is valid")
});

/// Comprehensive RPC transport error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server itself, not tx execution)
    #[error("RPC response error: {message} (code: {code:?})")]
    RpcResponse { message: String, code: Option<i64> },

    #[error("Account not found: {address}")]
    AccountNotFound { address: String },

    /// Response could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RpcError {
    /// Whether a transport-level retry could help
    ///
    /// Informational only: the pipeline never retries transport failures on
    /// its own.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::RpcResponse { code, .. } => matches!(code, Some(c) if (500..600).contains(c)),
            RpcError::AccountNotFound { .. } => false,
            RpcError::Decode(_) => false,
        }
    }
}

impl From<RpcError> for TxError {
    fn from(err: RpcError) -> Self {
        TxError::Transport(err.to_string())
    }
}

fn parse_sequence_mismatch(log: &str) -> Option<(u64, u64)> {
    let caps = SEQUENCE_MISMATCH_RE.captures(log)?;
    let expected = caps.get(1)?.as_str().parse().ok()?;
    let got = caps.get(2)?.as_str().parse().ok()?;
    Some((expected, got))
}

/// Map a check or deliver result onto the pipeline error taxonomy
///
/// `tx_size` is the encoded size of the submitted transaction, reported back
/// in [`TxError::TxTooLarge`].
pub fn classify_tx_result(result: &TxExecResult, tx_size: usize) -> Result<(), TxError> {
    if result.is_ok() {
        return Ok(());
    }
    let sdk = result.codespace.is_empty() || result.codespace == SDK_CODESPACE;
    let parsed = parse_sequence_mismatch(&result.log);

    if (sdk && result.code == CODE_WRONG_SEQUENCE) || parsed.is_some() {
        return Err(TxError::SequenceConflict {
            expected: parsed.map(|(e, _)| e),
            got: parsed.map(|(_, g)| g),
            log: result.log.clone(),
        });
    }
    if sdk && result.code == CODE_TX_TOO_LARGE {
        return Err(TxError::TxTooLarge {
            size: tx_size,
            reason: result.log.clone(),
        });
    }
    Err(TxError::ChainRejected {
        code: result.code,
        codespace: result.codespace.clone(),
        log: result.log.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: u32, codespace: &str, log: &str) -> TxExecResult {
        TxExecResult {
            code,
            codespace: codespace.to_string(),
            log: log.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ok_result_passes() {
        assert!(classify_tx_result(&result(0, "", ""), 10).is_ok());
    }

    #[test]
    fn test_wrong_sequence_by_code() {
        let log = "account sequence mismatch, expected 7, got 5: incorrect account sequence";
        let err = classify_tx_result(&result(32, "sdk", log), 10).unwrap_err();
        assert_eq!(
            err,
            TxError::SequenceConflict {
                expected: Some(7),
                got: Some(5),
                log: log.to_string(),
            }
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_wrong_sequence_by_log_only() {
        let err = classify_tx_result(
            &result(4, "custom", "Account sequence mismatch, expected 2, got 1"),
            10,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TxError::SequenceConflict {
                expected: Some(2),
                got: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_tx_too_large() {
        let err = classify_tx_result(&result(21, "sdk", "tx too large"), 4096).unwrap_err();
        assert_eq!(
            err,
            TxError::TxTooLarge {
                size: 4096,
                reason: "tx too large".to_string(),
            }
        );
    }

    #[test]
    fn test_hard_rejection_keeps_log() {
        let err = classify_tx_result(&result(13, "sdk", "insufficient fee"), 10).unwrap_err();
        assert_eq!(
            err,
            TxError::ChainRejected {
                code: 13,
                codespace: "sdk".to_string(),
                log: "insufficient fee".to_string(),
            }
        );
        // code 32 from another codespace is not a sequence conflict
        let err = classify_tx_result(&result(32, "wasm", "contract error"), 10).unwrap_err();
        assert!(matches!(err, TxError::ChainRejected { code: 32, .. }));
    }

    #[test]
    fn test_rpc_error_conversion() {
        let err: TxError = RpcError::Timeout {
            endpoint: "http://node:26657".to_string(),
            timeout_ms: 5000,
        }
        .into();
        assert!(matches!(err, TxError::Transport(_)));
        assert!(!err.is_retryable());
        assert!(RpcError::Transport {
            endpoint: "x".into(),
            message: "reset".into()
        }
        .is_transient());
        assert!(!RpcError::Decode("bad".into()).is_transient());
    }
}
