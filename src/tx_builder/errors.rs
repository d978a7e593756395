//! Error types for the transaction pipeline
//!
//! A single taxonomy covers every stage of a send: factory configuration,
//! fee resolution, signing, chain-side rejection and transport failures.
//! Every variant carries a stable machine-readable code (see [`TxError::code`])
//! next to its human readable message so callers can branch without parsing
//! strings.

use thiserror::Error;

/// Result alias used across the pipeline
pub type PipelineResult<T> = std::result::Result<T, TxError>;

/// Comprehensive error type for transaction building and broadcasting
///
/// Only [`TxError::SequenceConflict`] is retried automatically (by the
/// broadcast coordinator). [`TxError::TxTooLarge`] is handled by the batch
/// splitter through size halving. Everything else surfaces to the caller
/// immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Missing or invalid builder/client configuration
    ///
    /// This includes:
    /// - Empty chain id or sender address
    /// - Unknown broadcast or sign mode
    /// - Unparseable coin strings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Explicit fees and gas prices were both supplied
    #[error("Conflicting fee specification: fees={fees} and gas_prices={gas_prices} cannot both be set")]
    ConflictingFeeSpec {
        /// The explicit fee as supplied
        fees: String,
        /// The gas prices as supplied
        gas_prices: String,
    },

    /// Key lookup, password check or the signing primitive failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The chain rejected the transaction because its sequence was stale
    ///
    /// `log` is the chain's rejection message, kept verbatim.
    #[error("Sequence conflict: {log}")]
    SequenceConflict {
        /// Sequence the chain expected, when it could be parsed from the log
        expected: Option<u64>,
        /// Sequence the transaction carried, when it could be parsed from the log
        got: Option<u64>,
        /// Raw chain log
        log: String,
    },

    /// The signed transaction exceeds the accepted transaction size
    #[error("Transaction too large ({size} bytes): {reason}")]
    TxTooLarge {
        /// Encoded size of the rejected transaction
        size: usize,
        /// Local limit description or the chain log
        reason: String,
    },

    /// Network or node communication failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Hard rejection by the chain (bad signature, insufficient fee, ...)
    #[error("Chain rejected transaction (codespace={codespace}, code={code}): {log}")]
    ChainRejected {
        /// ABCI result code
        code: u32,
        /// ABCI codespace
        codespace: String,
        /// Raw chain log
        log: String,
    },

    /// A message failed its own basic validation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Envelope encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(String),

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TxError {
    /// Check if this error is retried by the broadcast coordinator
    ///
    /// Network-level failures are deliberately not retried here; that policy
    /// belongs to the transport or to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SequenceConflict { .. })
    }

    /// Whether the batch splitter should react by halving its chunk size
    pub fn is_too_large(&self) -> bool {
        matches!(self, Self::TxTooLarge { .. })
    }

    /// Stable machine-readable code
    pub fn code(&self) -> u32 {
        match self {
            Self::Config(_) => 1,
            Self::ConflictingFeeSpec { .. } => 2,
            Self::Signing(_) => 3,
            Self::SequenceConflict { .. } => 4,
            Self::TxTooLarge { .. } => 5,
            Self::Transport(_) => 6,
            Self::ChainRejected { .. } => 7,
            Self::InvalidMessage(_) => 8,
            Self::Codec(_) => 9,
            Self::Internal(_) => 10,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ConflictingFeeSpec { .. } => "fee",
            Self::Signing(_) => "signing",
            Self::SequenceConflict { .. } => "sequence",
            Self::TxTooLarge { .. } => "size",
            Self::Transport(_) => "transport",
            Self::ChainRejected { .. } => "chain",
            Self::InvalidMessage(_) => "message",
            Self::Codec(_) => "codec",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl TxError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// Create a signing error
    pub fn signing(reason: impl Into<String>) -> Self {
        Self::Signing(reason.into())
    }

    /// Create a codec error
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec(reason.into())
    }

    /// Create a too-large error for a transaction rejected by the local size check
    pub fn exceeds_limit(size: usize, limit: usize) -> Self {
        Self::TxTooLarge {
            size,
            reason: format!("exceeds limit of {} bytes", limit),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TxError::Config("chain id is empty".to_string());
        assert_eq!(err.to_string(), "Configuration error: chain id is empty");

        let err = TxError::SequenceConflict {
            expected: Some(7),
            got: Some(5),
            log: "account sequence mismatch, expected 7, got 5: incorrect account sequence"
                .to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Sequence conflict: account sequence mismatch, expected 7, got 5: incorrect account sequence"
        );

        let err = TxError::exceeds_limit(2048, 1024);
        assert_eq!(
            err.to_string(),
            "Transaction too large (2048 bytes): exceeds limit of 1024 bytes"
        );
    }

    #[test]
    fn test_error_retryability() {
        let conflict = TxError::SequenceConflict {
            expected: None,
            got: None,
            log: "stale".to_string(),
        };
        assert!(conflict.is_retryable());

        assert!(!TxError::Transport("timeout".to_string()).is_retryable());
        assert!(!TxError::Signing("no key".to_string()).is_retryable());
        assert!(!TxError::Config("bad".to_string()).is_retryable());
        assert!(!TxError::exceeds_limit(10, 5).is_retryable());
        assert!(TxError::exceeds_limit(10, 5).is_too_large());
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = vec![
            TxError::config("a"),
            TxError::ConflictingFeeSpec {
                fees: "1a".into(),
                gas_prices: "1a".into(),
            },
            TxError::signing("a"),
            TxError::SequenceConflict {
                expected: None,
                got: None,
                log: String::new(),
            },
            TxError::exceeds_limit(1, 0),
            TxError::Transport("a".into()),
            TxError::ChainRejected {
                code: 13,
                codespace: "sdk".into(),
                log: "insufficient fee".into(),
            },
            TxError::InvalidMessage("a".into()),
            TxError::codec("a"),
            TxError::internal("a"),
        ];
        let mut codes: Vec<u32> = errors.iter().map(TxError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TxError::config("x").category(), "config");
        assert_eq!(TxError::Transport("x".into()).category(), "transport");
        assert_eq!(TxError::internal("x").category(), "internal");
    }
}
