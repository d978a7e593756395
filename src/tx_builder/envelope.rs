//! Transaction envelope and message abstraction
//!
//! Messages are opaque to the pipeline. Module wrappers hand in anything that
//! implements [`Msg`]; the envelope only ever stores the packed [`AnyMsg`] form.

use super::errors::{PipelineResult, TxError};
use super::fee::Coins;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Capability set every domain message must provide
pub trait Msg: Send + Sync + fmt::Debug {
    /// Fully qualified type URL, e.g. `/cosmos.bank.v1beta1.MsgSend`
    fn type_url(&self) -> &str;

    /// Stateless validation run before the message is packed
    fn validate_basic(&self) -> PipelineResult<()>;

    /// Addresses that must sign a transaction carrying this message
    fn signers(&self) -> Vec<String>;

    /// Wire encoding of the message value
    fn encode(&self) -> Vec<u8>;

    fn to_any(&self) -> AnyMsg {
        AnyMsg {
            type_url: self.type_url().to_string(),
            value: self.encode(),
        }
    }
}

/// Shared handle to a message; cheap to clone when a batch is re-chunked
pub type BoxedMsg = Arc<dyn Msg>;

/// A message whose value has already been encoded by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMsg {
    type_url: String,
    value: Vec<u8>,
    signer: String,
}

impl RawMsg {
    pub fn new(type_url: impl Into<String>, value: Vec<u8>, signer: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
            signer: signer.into(),
        }
    }

    pub fn boxed(self) -> BoxedMsg {
        Arc::new(self)
    }
}

impl Msg for RawMsg {
    fn type_url(&self) -> &str {
        &self.type_url
    }

    fn validate_basic(&self) -> PipelineResult<()> {
        if !self.type_url.starts_with('/') {
            return Err(TxError::InvalidMessage(format!(
                "type url must start with '/': {:?}",
                self.type_url
            )));
        }
        if self.signer.is_empty() {
            return Err(TxError::InvalidMessage(format!(
                "{} has no signer",
                self.type_url
            )));
        }
        Ok(())
    }

    fn signers(&self) -> Vec<String> {
        vec![self.signer.clone()]
    }

    fn encode(&self) -> Vec<u8> {
        self.value.clone()
    }
}

/// Packed message as carried inside the envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyMsg {
    pub type_url: String,
    pub value: Vec<u8>,
}

/// Canonicalization used to produce the bytes that get signed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    /// Binary sign document over body and auth info
    Direct,
    /// Sorted-key JSON sign document
    LegacyJson,
}

impl fmt::Display for SignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignMode::Direct => f.write_str("direct"),
            SignMode::LegacyJson => f.write_str("legacy_json"),
        }
    }
}

impl FromStr for SignMode {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(SignMode::Direct),
            "legacy_json" | "amino-json" | "amino_json" => Ok(SignMode::LegacyJson),
            other => Err(TxError::config(format!("unknown sign mode: {:?}", other))),
        }
    }
}

/// Public key with its algorithm type URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    pub type_url: String,
    pub key: Vec<u8>,
}

/// Metadata of the signing account that is bound into the sign bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerData {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
}

/// A complete signature entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureV2 {
    pub public_key: PublicKey,
    pub sign_mode: SignMode,
    pub signature: Vec<u8>,
    pub sequence: u64,
}

impl SignatureV2 {
    /// Entry with the final structure but no signature bytes yet
    pub fn placeholder(public_key: PublicKey, sign_mode: SignMode, sequence: u64) -> Self {
        Self {
            public_key,
            sign_mode,
            signature: Vec::new(),
            sequence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub messages: Vec<AnyMsg>,
    pub memo: String,
    pub timeout_height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Coins,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub public_key: PublicKey,
    pub mode: SignMode,
    pub sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub signer_infos: Vec<SignerInfo>,
    pub fee: Fee,
}

/// The transaction as it travels over the wire
///
/// Signer infos live in `auth_info` (and are therefore covered by `Direct`
/// sign bytes); raw signature bytes live in `signatures`, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    pub body: TxBody,
    pub auth_info: AuthInfo,
    pub signatures: Vec<Vec<u8>>,
}

impl TxEnvelope {
    pub fn messages(&self) -> &[AnyMsg] {
        &self.body.messages
    }

    pub fn memo(&self) -> &str {
        &self.body.memo
    }

    pub fn fee(&self) -> &Fee {
        &self.auth_info.fee
    }

    /// Replace all signature entries, keeping signer infos and raw bytes aligned
    pub fn set_signatures(&mut self, signatures: Vec<SignatureV2>) {
        let (infos, raw): (Vec<_>, Vec<_>) = signatures
            .into_iter()
            .map(|sig| {
                (
                    SignerInfo {
                        public_key: sig.public_key,
                        mode: sig.sign_mode,
                        sequence: sig.sequence,
                    },
                    sig.signature,
                )
            })
            .unzip();
        self.auth_info.signer_infos = infos;
        self.signatures = raw;
    }

    /// Reassemble the signature entries
    pub fn signatures(&self) -> PipelineResult<Vec<SignatureV2>> {
        if self.auth_info.signer_infos.len() != self.signatures.len() {
            return Err(TxError::codec(format!(
                "{} signer infos but {} signatures",
                self.auth_info.signer_infos.len(),
                self.signatures.len()
            )));
        }
        Ok(self
            .auth_info
            .signer_infos
            .iter()
            .zip(&self.signatures)
            .map(|(info, sig)| SignatureV2 {
                public_key: info.public_key.clone(),
                sign_mode: info.mode,
                signature: sig.clone(),
                sequence: info.sequence,
            })
            .collect())
    }
}
