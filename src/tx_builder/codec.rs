//! Encoding and sign-byte collaborators
//!
//! The pipeline never reaches for a process-wide codec registry. A
//! [`TxConfig`] is built once per client and handed to every component that
//! needs to encode, decode or canonicalize a transaction.

use super::envelope::{AuthInfo, SignMode, SignerData, TxBody, TxEnvelope};
use super::errors::{PipelineResult, TxError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Produces canonical sign bytes for the supported sign modes
pub trait SignModeHandler: Send + Sync {
    /// Mode used when the factory has none configured
    fn default_mode(&self) -> SignMode;

    /// Every mode this handler can canonicalize
    fn modes(&self) -> &[SignMode];

    /// Canonical bytes to sign for `tx` under `mode`
    fn sign_bytes(
        &self,
        mode: SignMode,
        signer: &SignerData,
        tx: &TxEnvelope,
    ) -> PipelineResult<Vec<u8>>;
}

/// Transaction wire format plus the sign-mode handler that goes with it
pub trait TxConfig: Send + Sync {
    /// Binary wire encoding
    fn encode(&self, tx: &TxEnvelope) -> PipelineResult<Vec<u8>>;

    /// JSON wire encoding
    fn encode_json(&self, tx: &TxEnvelope) -> PipelineResult<Vec<u8>>;

    /// Inverse of [`TxConfig::encode`]
    fn decode(&self, bytes: &[u8]) -> PipelineResult<TxEnvelope>;

    fn sign_mode_handler(&self) -> Arc<dyn SignModeHandler>;

    /// Transaction hash: upper-case hex SHA-256 of the binary encoding
    fn tx_hash(&self, tx_bytes: &[u8]) -> String {
        hex::encode_upper(Sha256::digest(tx_bytes))
    }
}

// Field order is the canonical (sorted) key order of the JSON document
#[derive(Serialize)]
struct LegacySignDoc<'a> {
    account_number: String,
    chain_id: &'a str,
    fee: LegacyFee<'a>,
    memo: &'a str,
    msgs: Vec<LegacyMsg<'a>>,
    sequence: String,
    timeout_height: String,
}

#[derive(Serialize)]
struct LegacyFee<'a> {
    amount: Vec<LegacyCoin<'a>>,
    gas: String,
}

#[derive(Serialize)]
struct LegacyCoin<'a> {
    amount: String,
    denom: &'a str,
}

#[derive(Serialize)]
struct LegacyMsg<'a> {
    r#type: &'a str,
    value: String,
}

#[derive(Serialize)]
struct DirectSignDoc<'a> {
    body: &'a TxBody,
    auth_info: &'a AuthInfo,
    chain_id: &'a str,
    account_number: u64,
}

/// Sign-mode handler shipped with the crate
#[derive(Debug, Clone)]
pub struct DefaultSignModeHandler {
    default_mode: SignMode,
}

const SUPPORTED_MODES: [SignMode; 2] = [SignMode::Direct, SignMode::LegacyJson];

impl DefaultSignModeHandler {
    pub fn new(default_mode: SignMode) -> Self {
        Self { default_mode }
    }

    fn direct(signer: &SignerData, tx: &TxEnvelope) -> PipelineResult<Vec<u8>> {
        let doc = DirectSignDoc {
            body: &tx.body,
            auth_info: &tx.auth_info,
            chain_id: &signer.chain_id,
            account_number: signer.account_number,
        };
        bincode::serialize(&doc).map_err(|e| TxError::codec(e.to_string()))
    }

    fn legacy_json(signer: &SignerData, tx: &TxEnvelope) -> PipelineResult<Vec<u8>> {
        let doc = LegacySignDoc {
            account_number: signer.account_number.to_string(),
            chain_id: &signer.chain_id,
            fee: LegacyFee {
                amount: tx
                    .fee()
                    .amount
                    .iter()
                    .map(|c| LegacyCoin {
                        amount: c.amount.to_string(),
                        denom: &c.denom,
                    })
                    .collect(),
                gas: tx.fee().gas_limit.to_string(),
            },
            memo: tx.memo(),
            msgs: tx
                .messages()
                .iter()
                .map(|m| LegacyMsg {
                    r#type: &m.type_url,
                    value: hex::encode(&m.value),
                })
                .collect(),
            sequence: signer.sequence.to_string(),
            timeout_height: tx.body.timeout_height.to_string(),
        };
        serde_json::to_vec(&doc).map_err(|e| TxError::codec(e.to_string()))
    }
}

impl Default for DefaultSignModeHandler {
    fn default() -> Self {
        Self::new(SignMode::Direct)
    }
}

impl SignModeHandler for DefaultSignModeHandler {
    fn default_mode(&self) -> SignMode {
        self.default_mode
    }

    fn modes(&self) -> &[SignMode] {
        &SUPPORTED_MODES
    }

    fn sign_bytes(
        &self,
        mode: SignMode,
        signer: &SignerData,
        tx: &TxEnvelope,
    ) -> PipelineResult<Vec<u8>> {
        match mode {
            SignMode::Direct => Self::direct(signer, tx),
            SignMode::LegacyJson => Self::legacy_json(signer, tx),
        }
    }
}

/// bincode/JSON transaction format with the default sign-mode handler
#[derive(Clone)]
pub struct DefaultTxConfig {
    handler: Arc<DefaultSignModeHandler>,
}

impl DefaultTxConfig {
    pub fn new(default_mode: SignMode) -> Self {
        Self {
            handler: Arc::new(DefaultSignModeHandler::new(default_mode)),
        }
    }
}

impl Default for DefaultTxConfig {
    fn default() -> Self {
        Self::new(SignMode::Direct)
    }
}

impl TxConfig for DefaultTxConfig {
    fn encode(&self, tx: &TxEnvelope) -> PipelineResult<Vec<u8>> {
        bincode::serialize(tx).map_err(|e| TxError::codec(e.to_string()))
    }

    fn encode_json(&self, tx: &TxEnvelope) -> PipelineResult<Vec<u8>> {
        serde_json::to_vec(tx).map_err(|e| TxError::codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> PipelineResult<TxEnvelope> {
        bincode::deserialize(bytes).map_err(|e| TxError::codec(e.to_string()))
    }

    fn sign_mode_handler(&self) -> Arc<dyn SignModeHandler> {
        self.handler.clone()
    }
}
