//! Build outputs of the transaction factory
//!
//! [`UnsignedTx`] is the populated envelope before signing. [`SignedTx`] is the
//! immutable result: encoded bytes, the decoded envelope they came from and the
//! transaction hash.

use super::envelope::{SignatureV2, TxEnvelope};
use super::errors::PipelineResult;

/// A populated but unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    pub(crate) envelope: TxEnvelope,
}

impl UnsignedTx {
    pub fn envelope(&self) -> &TxEnvelope {
        &self.envelope
    }

    pub fn gas_limit(&self) -> u64 {
        self.envelope.auth_info.fee.gas_limit
    }
}

/// A signed, encoded transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    bytes: Vec<u8>,
    envelope: TxEnvelope,
    hash: String,
}

impl SignedTx {
    pub(crate) fn new(bytes: Vec<u8>, envelope: TxEnvelope, hash: String) -> Self {
        Self {
            bytes,
            envelope,
            hash,
        }
    }

    /// Encoded transaction bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn envelope(&self) -> &TxEnvelope {
        &self.envelope
    }

    /// Hash of the binary encoding
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn signatures(&self) -> PipelineResult<Vec<SignatureV2>> {
        self.envelope.signatures()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
