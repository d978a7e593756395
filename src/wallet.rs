//! Key management for transaction signing
//!
//! The pipeline only talks to the [`KeyManager`] trait. [`LocalKeyManager`] is
//! an in-memory ed25519 keyring with per-key passwords, suitable for tools,
//! tests and single-process services.

use crate::tx_builder::envelope::PublicKey;
use crate::tx_builder::errors::{PipelineResult, TxError};
use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use parking_lot::RwLock;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use zeroize::Zeroize;

/// Type URL of ed25519 public keys
pub const ED25519_PUBKEY_TYPE: &str = "/cosmos.crypto.ed25519.PubKey";

/// Public information about a stored key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
    pub address: String,
    pub public_key: PublicKey,
}

/// External key manager used by the transaction factory
pub trait KeyManager: Send + Sync {
    /// Look up a key by name
    fn find(&self, name: &str) -> PipelineResult<KeyInfo>;

    /// Sign `msg` with the named key, returning the signature and public key
    fn sign(&self, name: &str, password: &str, msg: &[u8]) -> PipelineResult<(Vec<u8>, PublicKey)>;
}

/// Derive the account address of a public key (hex of the first 20 bytes of its SHA-256)
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let digest = Sha256::digest(&public_key.key);
    hex::encode(&digest[..20])
}

/// Verify an ed25519 signature produced by [`LocalKeyManager`]
pub fn verify_signature(public_key: &PublicKey, msg: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key.key.as_slice()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(msg, &sig).is_ok()
}

struct StoredKey {
    signing_key: SigningKey,
    password_hash: [u8; 32],
    info: KeyInfo,
}

fn hash_password(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// In-memory ed25519 keyring
#[derive(Default)]
pub struct LocalKeyManager {
    keys: RwLock<HashMap<String, StoredKey>>,
}

impl LocalKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key from its 32-byte secret; replaces any key with the same name
    pub fn add(&self, name: &str, password: &str, mut secret: [u8; 32]) -> PipelineResult<KeyInfo> {
        if name.is_empty() {
            secret.zeroize();
            return Err(TxError::signing("key name must not be empty"));
        }
        if secret.iter().all(|&b| b == 0) {
            return Err(TxError::signing("invalid key: all-zero secret rejected"));
        }
        let signing_key = SigningKey::from_bytes(&secret);
        secret.zeroize();

        let public_key = PublicKey {
            type_url: ED25519_PUBKEY_TYPE.to_string(),
            key: signing_key.verifying_key().to_bytes().to_vec(),
        };
        let info = KeyInfo {
            name: name.to_string(),
            address: address_from_public_key(&public_key),
            public_key,
        };
        debug!(key = %name, address = %info.address, "Key added to keyring");
        self.keys.write().insert(
            name.to_string(),
            StoredKey {
                signing_key,
                password_hash: hash_password(password),
                info: info.clone(),
            },
        );
        Ok(info)
    }

    /// Generate a fresh random key
    pub fn generate(&self, name: &str, password: &str) -> PipelineResult<KeyInfo> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        self.add(name, password, secret)
    }

    /// Import a key from a file holding either 32 raw bytes, a JSON byte array
    /// or a hex string
    pub fn import_file(&self, name: &str, password: &str, path: impl AsRef<Path>) -> Result<KeyInfo> {
        let path = path.as_ref();
        let mut raw = std::fs::read(path)
            .with_context(|| format!("Failed to read key file: {}", path.display()))?;

        let mut secret = if raw.len() == 32 {
            raw.clone()
        } else {
            let text = std::str::from_utf8(&raw).context("Key file is neither raw bytes nor text")?;
            let text = text.trim();
            if text.starts_with('[') {
                serde_json::from_str::<Vec<u8>>(text).context("Failed to parse key JSON")?
            } else {
                hex::decode(text).context("Failed to parse key hex")?
            }
        };
        raw.zeroize();

        let result = match <[u8; 32]>::try_from(secret.as_slice()) {
            Ok(bytes) => self.add(name, password, bytes).map_err(anyhow::Error::from),
            Err(_) => Err(anyhow::anyhow!(
                "Invalid key length: expected 32 bytes, got {}",
                secret.len()
            )),
        };
        secret.zeroize();
        result
    }

    pub fn remove(&self, name: &str) -> bool {
        self.keys.write().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl KeyManager for LocalKeyManager {
    fn find(&self, name: &str) -> PipelineResult<KeyInfo> {
        self.keys
            .read()
            .get(name)
            .map(|k| k.info.clone())
            .ok_or_else(|| TxError::signing(format!("key not found: {}", name)))
    }

    fn sign(&self, name: &str, password: &str, msg: &[u8]) -> PipelineResult<(Vec<u8>, PublicKey)> {
        let keys = self.keys.read();
        let key = keys
            .get(name)
            .ok_or_else(|| TxError::signing(format!("key not found: {}", name)))?;
        if key.password_hash != hash_password(password) {
            return Err(TxError::signing(format!("wrong password for key: {}", name)));
        }
        let signature = key.signing_key.sign(msg);
        Ok((signature.to_bytes().to_vec(), key.info.public_key.clone()))
    }
}
