//! Transaction builder
//!
//! This module turns a list of opaque domain messages plus a fee/gas
//! configuration into signed transaction bytes.
//!
//! ## Architecture
//!
//! - **errors**: Error taxonomy shared by the whole pipeline
//! - **fee**: Coins, gas prices and `ceil(price × gas)` fee derivation
//! - **envelope**: Message capability trait and the wire envelope
//! - **codec**: Wire format and sign-byte collaborators (`TxConfig`, `SignModeHandler`)
//! - **factory**: The single-use `TxFactory` builder
//! - **output**: `UnsignedTx` / `SignedTx`
//!
//! ## Signing order
//!
//! Signing is two-phase. A placeholder signature entry (right public key,
//! sign mode and sequence, empty bytes) is installed before the sign bytes are
//! computed, because `Direct` sign bytes cover the signer infos derived from
//! the signature list. The real signature replaces the placeholder afterwards.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tx_pipeline::tx_builder::{DefaultTxConfig, RawMsg, TxError, TxFactory};
//! use tx_pipeline::wallet::LocalKeyManager;
//!
//! # fn example() -> Result<(), TxError> {
//! let keys = Arc::new(LocalKeyManager::new());
//! let alice = keys.add("alice", "password", [1u8; 32])?;
//!
//! let msg = RawMsg::new("/cosmos.bank.v1beta1.MsgSend", vec![], alice.address.clone()).boxed();
//! let bytes = TxFactory::new()
//!     .with_chain_id("test-1")
//!     .with_address(alice.address)
//!     .with_account_number(3)
//!     .with_sequence(0)
//!     .with_gas(200_000)
//!     .with_password("password")
//!     .with_key_manager(keys)
//!     .with_tx_config(Arc::new(DefaultTxConfig::default()))
//!     .build_and_sign("alice", &[msg], false)?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

// Public API - Error types
pub mod errors;
pub use errors::{PipelineResult, TxError};

pub mod codec;
pub mod envelope;
pub mod factory;
pub mod fee;
pub mod output;

// Re-export key types for convenience
pub use codec::{DefaultSignModeHandler, DefaultTxConfig, SignModeHandler, TxConfig};
pub use envelope::{
    AnyMsg, BoxedMsg, Msg, PublicKey, RawMsg, SignMode, SignatureV2, SignerData, TxEnvelope,
};
pub use factory::TxFactory;
pub use fee::{Coin, Coins, DecCoin, DecCoins};
pub use output::{SignedTx, UnsignedTx};
