//! Transaction factory
//!
//! [`TxFactory`] accumulates everything needed to turn a list of messages into
//! signed transaction bytes. Setters take and return the factory by value and
//! the final [`TxFactory::build_and_sign`] consumes it, so one factory serves
//! exactly one build and cannot be shared between concurrent sends.

use super::codec::{SignModeHandler, TxConfig};
use super::envelope::{AuthInfo, BoxedMsg, Fee, SignMode, SignatureV2, SignerData, TxBody, TxEnvelope};
use super::errors::{PipelineResult, TxError};
use super::fee::{resolve_fee, Coins, DecCoins};
use super::output::{SignedTx, UnsignedTx};
use crate::types::BroadcastMode;
use crate::wallet::KeyManager;
use std::sync::Arc;
use tracing::{debug, trace};

/// Single-use transaction builder
#[derive(Default)]
pub struct TxFactory {
    chain_id: String,
    address: String,
    account_number: u64,
    sequence: u64,
    gas: u64,
    gas_adjustment: f64,
    fees: Coins,
    gas_prices: DecCoins,
    memo: String,
    mode: BroadcastMode,
    password: String,
    sign_mode: Option<SignMode>,
    sign_mode_handler: Option<Arc<dyn SignModeHandler>>,
    tx_config: Option<Arc<dyn TxConfig>>,
    key_manager: Option<Arc<dyn KeyManager>>,
}

impl TxFactory {
    pub fn new() -> Self {
        Self {
            gas_adjustment: 1.0,
            ..Default::default()
        }
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_account_number(mut self, account_number: u64) -> Self {
        self.account_number = account_number;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_gas_adjustment(mut self, gas_adjustment: f64) -> Self {
        self.gas_adjustment = gas_adjustment;
        self
    }

    pub fn with_fee(mut self, fees: Coins) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_gas_prices(mut self, gas_prices: DecCoins) -> Self {
        self.gas_prices = gas_prices;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_mode(mut self, mode: BroadcastMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_sign_mode(mut self, sign_mode: SignMode) -> Self {
        self.sign_mode = Some(sign_mode);
        self
    }

    pub fn with_sign_mode_handler(mut self, handler: Arc<dyn SignModeHandler>) -> Self {
        self.sign_mode_handler = Some(handler);
        self
    }

    /// Set the wire format; also supplies the sign-mode handler unless one was set explicitly
    pub fn with_tx_config(mut self, tx_config: Arc<dyn TxConfig>) -> Self {
        self.tx_config = Some(tx_config);
        self
    }

    pub fn with_key_manager(mut self, key_manager: Arc<dyn KeyManager>) -> Self {
        self.key_manager = Some(key_manager);
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn gas(&self) -> u64 {
        self.gas
    }

    pub fn gas_adjustment(&self) -> f64 {
        self.gas_adjustment
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn account_number(&self) -> u64 {
        self.account_number
    }

    pub fn mode(&self) -> BroadcastMode {
        self.mode
    }

    fn tx_config(&self) -> PipelineResult<&Arc<dyn TxConfig>> {
        self.tx_config
            .as_ref()
            .ok_or_else(|| TxError::config("tx config is not set"))
    }

    fn handler(&self) -> PipelineResult<Arc<dyn SignModeHandler>> {
        match (&self.sign_mode_handler, &self.tx_config) {
            (Some(handler), _) => Ok(handler.clone()),
            (None, Some(config)) => Ok(config.sign_mode_handler()),
            (None, None) => Err(TxError::config("sign mode handler is not set")),
        }
    }

    /// Populate a fresh envelope with messages, memo, fee and gas limit
    pub fn build_unsigned(&self, msgs: &[BoxedMsg]) -> PipelineResult<UnsignedTx> {
        if self.chain_id.is_empty() {
            return Err(TxError::config("chain id is required"));
        }
        if self.address.is_empty() {
            return Err(TxError::config("sender address is required"));
        }
        if msgs.is_empty() {
            return Err(TxError::config("at least one message is required"));
        }

        let mut messages = Vec::with_capacity(msgs.len());
        for msg in msgs {
            msg.validate_basic()?;
            messages.push(msg.to_any());
        }

        let amount = resolve_fee(&self.fees, &self.gas_prices, self.gas)?;
        trace!(gas = self.gas, fee = %amount, msgs = msgs.len(), "Built unsigned transaction");

        Ok(UnsignedTx {
            envelope: TxEnvelope {
                body: TxBody {
                    messages,
                    memo: self.memo.clone(),
                    timeout_height: 0,
                },
                auth_info: AuthInfo {
                    signer_infos: Vec::new(),
                    fee: Fee {
                        amount,
                        gas_limit: self.gas,
                    },
                },
                signatures: Vec::new(),
            },
        })
    }

    /// Sign an unsigned transaction with the named key
    ///
    /// The placeholder signature must be in place before the sign bytes are
    /// computed: `Direct` sign bytes cover the signer infos derived from it.
    pub fn sign(&self, name: &str, unsigned: UnsignedTx) -> PipelineResult<SignedTx> {
        let key_manager = self
            .key_manager
            .as_ref()
            .ok_or_else(|| TxError::config("key manager is not set"))?;
        let handler = self.handler()?;
        let tx_config = self.tx_config()?;

        let sign_mode = self.sign_mode.unwrap_or_else(|| handler.default_mode());
        if !handler.modes().contains(&sign_mode) {
            return Err(TxError::config(format!(
                "sign mode {} is not supported by the handler",
                sign_mode
            )));
        }

        let signer = SignerData {
            chain_id: self.chain_id.clone(),
            account_number: self.account_number,
            sequence: self.sequence,
        };
        let key = key_manager.find(name)?;

        let mut envelope = unsigned.envelope;
        envelope.set_signatures(vec![SignatureV2::placeholder(
            key.public_key.clone(),
            sign_mode,
            self.sequence,
        )]);

        let sign_bytes = handler.sign_bytes(sign_mode, &signer, &envelope)?;
        let (signature, public_key) = key_manager.sign(name, &self.password, &sign_bytes)?;
        if public_key != key.public_key {
            return Err(TxError::signing(format!(
                "key manager returned a different public key for {}",
                name
            )));
        }

        envelope.set_signatures(vec![SignatureV2 {
            public_key,
            sign_mode,
            signature,
            sequence: self.sequence,
        }]);

        let bytes = tx_config.encode(&envelope)?;
        let hash = tx_config.tx_hash(&bytes);
        debug!(
            key = %name,
            sequence = self.sequence,
            account_number = self.account_number,
            sign_mode = %sign_mode,
            size = bytes.len(),
            hash = %hash,
            "Signed transaction"
        );
        Ok(SignedTx::new(bytes, envelope, hash))
    }

    /// Build and sign, returning the binary-encoded transaction
    pub fn build_signed(&self, name: &str, msgs: &[BoxedMsg]) -> PipelineResult<SignedTx> {
        let unsigned = self.build_unsigned(msgs)?;
        self.sign(name, unsigned)
    }

    /// Build, sign and encode in the JSON or binary wire format
    pub fn build_and_sign(self, name: &str, msgs: &[BoxedMsg], as_json: bool) -> PipelineResult<Vec<u8>> {
        let signed = self.build_signed(name, msgs)?;
        if as_json {
            self.tx_config()?.encode_json(signed.envelope())
        } else {
            Ok(signed.into_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::codec::DefaultTxConfig;
    use crate::tx_builder::envelope::RawMsg;
    use crate::tx_builder::fee::Coin;
    use crate::wallet::{verify_signature, LocalKeyManager};

    fn keys() -> (Arc<LocalKeyManager>, String) {
        let keys = Arc::new(LocalKeyManager::new());
        let info = keys.add("alice", "pw", [5u8; 32]).unwrap();
        (keys, info.address)
    }

    fn msgs(signer: &str, n: usize) -> Vec<BoxedMsg> {
        (0..n)
            .map(|i| RawMsg::new("/bank.MsgSend", vec![i as u8], signer).boxed())
            .collect()
    }

    fn alice_factory() -> (TxFactory, String) {
        let (keys, address) = keys();
        let factory = TxFactory::new()
            .with_chain_id("test-1")
            .with_address(address.clone())
            .with_account_number(9)
            .with_sequence(4)
            .with_gas(100_000)
            .with_password("pw")
            .with_memo("hi")
            .with_key_manager(keys)
            .with_tx_config(Arc::new(DefaultTxConfig::default()));
        (factory, address)
    }

    #[test]
    fn test_build_unsigned_requires_chain_id() {
        let (factory, address) = alice_factory();
        let err = factory
            .with_chain_id("")
            .build_unsigned(&msgs(&address, 1))
            .unwrap_err();
        assert!(matches!(err, TxError::Config(_)));
    }

    #[test]
    fn test_build_unsigned_rejects_empty_and_invalid_messages() {
        let (factory, address) = alice_factory();
        assert!(matches!(
            factory.build_unsigned(&[]),
            Err(TxError::Config(_))
        ));
        let bad: Vec<BoxedMsg> = vec![RawMsg::new("no-slash", vec![], address).boxed()];
        assert!(matches!(
            factory.build_unsigned(&bad),
            Err(TxError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_fee_derived_from_gas_prices() {
        let (factory, address) = alice_factory();
        let unsigned = factory
            .with_gas_prices(DecCoins::parse("1denom").unwrap())
            .build_unsigned(&msgs(&address, 1))
            .unwrap();
        let fee = unsigned.envelope().fee();
        assert_eq!(fee.gas_limit, 100_000);
        assert_eq!(fee.amount, Coins::new(vec![Coin::new(100_000, "denom")]).unwrap());
        assert_eq!(unsigned.envelope().memo(), "hi");
    }

    #[test]
    fn test_conflicting_fee_spec() {
        let (factory, address) = alice_factory();
        let err = factory
            .with_fee(Coins::parse("5denom").unwrap())
            .with_gas_prices(DecCoins::parse("1denom").unwrap())
            .build_unsigned(&msgs(&address, 1))
            .unwrap_err();
        assert!(matches!(err, TxError::ConflictingFeeSpec { .. }));
    }

    #[test]
    fn test_signature_verifies_against_final_envelope() {
        let (factory, address) = alice_factory();
        let config = DefaultTxConfig::default();
        let signed = factory.build_signed("alice", &msgs(&address, 2)).unwrap();

        let sigs = signed.signatures().unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].sequence, 4);
        assert_eq!(sigs[0].sign_mode, SignMode::Direct);

        let signer = SignerData {
            chain_id: "test-1".into(),
            account_number: 9,
            sequence: 4,
        };
        let handler = config.sign_mode_handler();
        let sign_bytes = handler
            .sign_bytes(SignMode::Direct, &signer, signed.envelope())
            .unwrap();
        assert!(verify_signature(&sigs[0].public_key, &sign_bytes, &sigs[0].signature));

        // sign bytes computed without the signer info do not verify
        let mut bare = signed.envelope().clone();
        bare.set_signatures(Vec::new());
        let bare_bytes = handler.sign_bytes(SignMode::Direct, &signer, &bare).unwrap();
        assert!(!verify_signature(&sigs[0].public_key, &bare_bytes, &sigs[0].signature));
    }

    #[test]
    fn test_legacy_json_sign_mode() {
        let (factory, address) = alice_factory();
        let signed = factory
            .with_sign_mode(SignMode::LegacyJson)
            .build_signed("alice", &msgs(&address, 1))
            .unwrap();
        assert_eq!(signed.signatures().unwrap()[0].sign_mode, SignMode::LegacyJson);
    }

    #[test]
    fn test_signing_errors() {
        let (factory, address) = alice_factory();
        let err = factory.build_signed("mallory", &msgs(&address, 1)).unwrap_err();
        assert!(matches!(err, TxError::Signing(_)));

        let (factory, address) = alice_factory();
        let err = factory
            .with_password("wrong")
            .build_signed("alice", &msgs(&address, 1))
            .unwrap_err();
        assert!(matches!(err, TxError::Signing(_)));
    }

    #[test]
    fn test_missing_key_manager_is_config_error() {
        let factory = TxFactory::new()
            .with_chain_id("test-1")
            .with_address("addr")
            .with_tx_config(Arc::new(DefaultTxConfig::default()));
        let err = factory.build_signed("alice", &msgs("addr", 1)).unwrap_err();
        assert!(matches!(err, TxError::Config(_)));
    }

    #[test]
    fn test_build_and_sign_is_deterministic() {
        let (a, address) = alice_factory();
        let (b, _) = alice_factory();
        let bytes_a = a.build_and_sign("alice", &msgs(&address, 3), false).unwrap();
        let bytes_b = b.build_and_sign("alice", &msgs(&address, 3), false).unwrap();
        assert_eq!(bytes_a, bytes_b);

        let (c, _) = alice_factory();
        let json = c.build_and_sign("alice", &msgs(&address, 3), true).unwrap();
        let decoded: TxEnvelope = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, DefaultTxConfig::default().decode(&bytes_a).unwrap());
    }
}
