//! Test Utilities Module
//!
//! In-memory chain and fixtures for deterministic pipeline tests. The mock
//! chain decodes every submitted envelope, verifies its signature and enforces
//! account sequences the way a node's admission check would.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::rpc_manager::rpc_errors::{CODE_TX_TOO_LARGE, CODE_WRONG_SEQUENCE, SDK_CODESPACE};
use crate::rpc_manager::{AccountQuerier, BroadcastTransport, RpcError};
use crate::tx_builder::codec::{DefaultTxConfig, TxConfig};
use crate::tx_builder::envelope::{SignerData, TxEnvelope};
use crate::types::{AccountInfo, BroadcastMode, BroadcastResponse, SimulateResponse, TxExecResult};
use crate::wallet::{address_from_public_key, verify_signature};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Gas reported per message by [`MockChain::simulate`]
pub const GAS_PER_MSG: u64 = 50_000;

#[derive(Debug, Clone, Copy)]
struct MockAccount {
    account_number: u64,
    sequence: u64,
}

/// One transaction as seen by the mock chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub address: String,
    pub sequence: u64,
    pub msg_count: usize,
    pub mode: BroadcastMode,
    /// Result code the chain answered with
    pub code: u32,
}

impl Submission {
    pub fn accepted(&self) -> bool {
        self.code == 0
    }
}

#[derive(Default)]
struct InFlight {
    current: HashMap<String, usize>,
    max: HashMap<String, usize>,
}

/// Account querier and broadcast transport backed by in-memory state
pub struct MockChain {
    chain_id: String,
    tx_config: Arc<dyn TxConfig>,
    accounts: Mutex<HashMap<String, MockAccount>>,
    submissions: Mutex<Vec<Submission>>,
    scripted: Mutex<VecDeque<TxExecResult>>,
    deliver_failures: Mutex<VecDeque<TxExecResult>>,
    in_flight: Mutex<InFlight>,
    queries: AtomicUsize,
    simulations: AtomicUsize,
    height: AtomicU64,
    always_conflict: AtomicBool,
    fail_queries: AtomicBool,
    max_msgs_per_tx: AtomicUsize,
    submit_delay_ms: AtomicU64,
    query_delay_once_ms: AtomicU64,
}

impl MockChain {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self::with_tx_config(chain_id, Arc::new(DefaultTxConfig::default()))
    }

    pub fn with_tx_config(chain_id: impl Into<String>, tx_config: Arc<dyn TxConfig>) -> Self {
        Self {
            chain_id: chain_id.into(),
            tx_config,
            accounts: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
            deliver_failures: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(InFlight::default()),
            queries: AtomicUsize::new(0),
            simulations: AtomicUsize::new(0),
            height: AtomicU64::new(1),
            always_conflict: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
            max_msgs_per_tx: AtomicUsize::new(0),
            submit_delay_ms: AtomicU64::new(0),
            query_delay_once_ms: AtomicU64::new(0),
        }
    }

    /// Create or overwrite an account
    pub fn set_account(&self, address: &str, account_number: u64, sequence: u64) {
        self.accounts.lock().insert(
            address.to_string(),
            MockAccount {
                account_number,
                sequence,
            },
        );
    }

    /// Next sequence the chain expects from `address`
    pub fn sequence_of(&self, address: &str) -> Option<u64> {
        self.accounts.lock().get(address).map(|a| a.sequence)
    }

    /// Advance an account as if another process had sent a transaction
    pub fn bump_sequence(&self, address: &str) {
        if let Some(account) = self.accounts.lock().get_mut(address) {
            account.sequence += 1;
        }
    }

    /// Report a sequence mismatch for every submission
    pub fn set_always_conflict(&self, on: bool) {
        self.always_conflict.store(on, Ordering::SeqCst);
    }

    /// Make account queries fail
    pub fn set_fail_queries(&self, on: bool) {
        self.fail_queries.store(on, Ordering::SeqCst);
    }

    /// Reject transactions carrying more than `max` messages as too large;
    /// zero disables the check
    pub fn set_max_msgs_per_tx(&self, max: usize) {
        self.max_msgs_per_tx.store(max, Ordering::SeqCst);
    }

    /// Hold every submission for `delay` before it is checked
    pub fn set_submit_delay(&self, delay: Duration) {
        self.submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Hold the next account query for `delay` after the account was read
    pub fn set_query_delay_once(&self, delay: Duration) {
        self.query_delay_once_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Admit the next valid `Commit` submission (its sequence is consumed)
    /// but report `result` as its execution outcome
    pub fn push_deliver_failure(&self, result: TxExecResult) {
        self.deliver_failures.lock().push_back(result);
    }

    /// Answer the next valid submission with `result` instead of accepting it
    pub fn push_result(&self, result: TxExecResult) {
        self.scripted.lock().push_back(result);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    pub fn accepted(&self) -> Vec<Submission> {
        self.submissions
            .lock()
            .iter()
            .filter(|s| s.accepted())
            .cloned()
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn simulation_count(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently processed submissions seen for `address`
    pub fn max_in_flight(&self, address: &str) -> usize {
        self.in_flight.lock().max.get(address).copied().unwrap_or(0)
    }

    fn enter(&self, address: &str) {
        let mut in_flight = self.in_flight.lock();
        let current = {
            let entry = in_flight.current.entry(address.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let max = in_flight.max.entry(address.to_string()).or_insert(0);
        *max = (*max).max(current);
    }

    fn leave(&self, address: &str) {
        if let Some(current) = self.in_flight.lock().current.get_mut(address) {
            *current = current.saturating_sub(1);
        }
    }

    fn decode(&self, tx_bytes: &[u8]) -> Result<TxEnvelope, RpcError> {
        self.tx_config
            .decode(tx_bytes)
            .map_err(|e| RpcError::Decode(e.to_string()))
    }

    fn failure(code: u32, log: String) -> TxExecResult {
        TxExecResult {
            code,
            codespace: SDK_CODESPACE.to_string(),
            log,
            ..Default::default()
        }
    }

    /// Run the admission check and, on success, consume the sequence
    fn execute(&self, envelope: &TxEnvelope, address: &str) -> TxExecResult {
        let Some(info) = envelope.auth_info.signer_infos.first() else {
            return Self::failure(4, "no signatures supplied".to_string());
        };
        let Some(signature) = envelope.signatures.first() else {
            return Self::failure(4, "no signatures supplied".to_string());
        };

        let mut accounts = self.accounts.lock();
        let Some(account) = accounts.get_mut(address) else {
            return Self::failure(9, format!("account {} not found", address));
        };

        let signer = SignerData {
            chain_id: self.chain_id.clone(),
            account_number: account.account_number,
            sequence: info.sequence,
        };
        let verified = self
            .tx_config
            .sign_mode_handler()
            .sign_bytes(info.mode, &signer, envelope)
            .map(|bytes| verify_signature(&info.public_key, &bytes, signature))
            .unwrap_or(false);

        if self.always_conflict.load(Ordering::SeqCst) || info.sequence != account.sequence {
            return Self::failure(
                CODE_WRONG_SEQUENCE,
                format!(
                    "account sequence mismatch, expected {}, got {}: incorrect account sequence",
                    account.sequence, info.sequence
                ),
            );
        }
        if !verified {
            return Self::failure(4, "signature verification failed".to_string());
        }
        let max_msgs = self.max_msgs_per_tx.load(Ordering::SeqCst);
        if max_msgs > 0 && envelope.messages().len() > max_msgs {
            return Self::failure(CODE_TX_TOO_LARGE, "tx too large".to_string());
        }
        if let Some(scripted) = self.scripted.lock().pop_front() {
            return scripted;
        }

        account.sequence += 1;
        let gas_used = GAS_PER_MSG * envelope.messages().len() as u64;
        TxExecResult {
            code: 0,
            codespace: String::new(),
            log: String::new(),
            gas_wanted: envelope.fee().gas_limit,
            gas_used,
        }
    }
}

#[async_trait]
impl AccountQuerier for MockChain {
    async fn query_account(&self, address: &str) -> Result<AccountInfo, RpcError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(RpcError::Transport {
                endpoint: "mock".to_string(),
                message: "connection refused".to_string(),
            });
        }
        let info = self
            .accounts
            .lock()
            .get(address)
            .map(|a| AccountInfo {
                account_number: a.account_number,
                sequence: a.sequence,
            })
            .ok_or_else(|| RpcError::AccountNotFound {
                address: address.to_string(),
            });

        let delay = self.query_delay_once_ms.swap(0, Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        info
    }
}

#[async_trait]
impl BroadcastTransport for MockChain {
    async fn submit(&self, tx_bytes: &[u8], mode: BroadcastMode) -> Result<BroadcastResponse, RpcError> {
        let envelope = self.decode(tx_bytes)?;
        let address = envelope
            .auth_info
            .signer_infos
            .first()
            .map(|info| address_from_public_key(&info.public_key))
            .unwrap_or_default();

        self.enter(&address);
        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let result = self.execute(&envelope, &address);
        self.leave(&address);

        self.submissions.lock().push(Submission {
            address,
            sequence: envelope
                .auth_info
                .signer_infos
                .first()
                .map(|i| i.sequence)
                .unwrap_or_default(),
            msg_count: envelope.messages().len(),
            mode,
            code: result.code,
        });

        let height = if result.is_ok() {
            self.height.fetch_add(1, Ordering::SeqCst)
        } else {
            0
        };
        let (check, deliver) = match mode {
            BroadcastMode::Async => (None, None),
            BroadcastMode::Sync => (Some(result), None),
            BroadcastMode::Commit => {
                let deliver = if result.is_ok() {
                    self.deliver_failures.lock().pop_front().unwrap_or_else(|| result.clone())
                } else {
                    result.clone()
                };
                (Some(result), Some(deliver))
            }
        };
        Ok(BroadcastResponse {
            hash: self.tx_config.tx_hash(tx_bytes),
            height,
            check,
            deliver,
        })
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> Result<SimulateResponse, RpcError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        let envelope = self.decode(tx_bytes)?;
        Ok(SimulateResponse {
            gas_used: GAS_PER_MSG * envelope.messages().len() as u64,
        })
    }
}

/// Keys, messages and a ready client wired to a [`MockChain`]
pub mod fixtures {
    use super::*;
    use crate::client::TxClient;
    use crate::config::ClientConfig;
    use crate::tx_builder::envelope::{BoxedMsg, Msg, RawMsg};
    use crate::tx_builder::errors::PipelineResult;
    use crate::wallet::{KeyManager, LocalKeyManager};

    pub const CHAIN_ID: &str = "test-chain";
    pub const PASSWORD: &str = "password";
    pub const SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";

    /// Keyring holding `alice`, `bob` and `carol`
    pub fn keyring() -> Arc<LocalKeyManager> {
        let keys = Arc::new(LocalKeyManager::new());
        for (name, secret) in [("alice", [1u8; 32]), ("bob", [2u8; 32]), ("carol", [3u8; 32])] {
            keys.add(name, PASSWORD, secret)
                .expect("fixture keys are valid");
        }
        keys
    }

    /// `n` transfer messages signed by `signer`
    pub fn transfer_msgs(signer: &str, n: usize) -> Vec<BoxedMsg> {
        (0..n)
            .map(|i| RawMsg::new(SEND_TYPE_URL, (i as u64).to_le_bytes().to_vec(), signer).boxed())
            .collect()
    }

    pub fn test_config() -> ClientConfig {
        ClientConfig::new(CHAIN_ID)
    }

    /// Base transaction for a fixture key
    pub fn base_tx(name: &str) -> crate::types::BaseTx {
        crate::types::BaseTx::new(name, PASSWORD)
    }

    /// A client, its chain and keyring
    pub struct TestEnv {
        pub client: TxClient,
        pub chain: Arc<MockChain>,
        pub keys: Arc<LocalKeyManager>,
    }

    impl TestEnv {
        pub fn address(&self, name: &str) -> String {
            self.keys
                .find(name)
                .expect("fixture key exists")
                .address
        }
    }

    /// Chain with alice (account 1, sequence 5), bob (2, 0) and carol (3, 0)
    pub fn test_env(config: ClientConfig) -> TestEnv {
        let keys = keyring();
        let chain = Arc::new(MockChain::new(config.chain_id.clone()));
        for (name, account_number, sequence) in [("alice", 1, 5), ("bob", 2, 0), ("carol", 3, 0)] {
            let address = keys.find(name).expect("fixture key exists").address;
            chain.set_account(&address, account_number, sequence);
        }
        let client = TxClient::new(
            config,
            chain.clone(),
            chain.clone(),
            keys.clone(),
            Arc::new(DefaultTxConfig::default()),
        )
        .expect("fixture config is valid");
        TestEnv { client, chain, keys }
    }

    /// Message whose encoding panics
    #[derive(Debug)]
    pub struct PanickingMsg {
        pub signer: String,
    }

    impl Msg for PanickingMsg {
        fn type_url(&self) -> &str {
            "/test.MsgPanic"
        }

        fn validate_basic(&self) -> PipelineResult<()> {
            Ok(())
        }

        fn signers(&self) -> Vec<String> {
            vec![self.signer.clone()]
        }

        fn encode(&self) -> Vec<u8> {
            panic!("message encoding exploded")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::tx_builder::factory::TxFactory;
    use crate::wallet::KeyManager;

    fn signed_bytes(sequence: u64) -> (Arc<MockChain>, Vec<u8>, String) {
        let keys = keyring();
        let address = keys.find("alice").unwrap().address;
        let chain = Arc::new(MockChain::new(CHAIN_ID));
        chain.set_account(&address, 1, 5);
        let bytes = TxFactory::new()
            .with_chain_id(CHAIN_ID)
            .with_address(address.clone())
            .with_account_number(1)
            .with_sequence(sequence)
            .with_gas(200_000)
            .with_password(PASSWORD)
            .with_key_manager(keys)
            .with_tx_config(Arc::new(DefaultTxConfig::default()))
            .build_and_sign("alice", &transfer_msgs(&address, 2), false)
            .unwrap();
        (chain, bytes, address)
    }

    #[tokio::test]
    async fn test_accepts_valid_and_rejects_stale() {
        let (chain, bytes, address) = signed_bytes(5);
        let response = chain.submit(&bytes, BroadcastMode::Sync).await.unwrap();
        assert!(response.check.as_ref().unwrap().is_ok());
        assert_eq!(chain.sequence_of(&address), Some(6));

        let again = chain.submit(&bytes, BroadcastMode::Sync).await.unwrap();
        let check = again.check.unwrap();
        assert_eq!(check.code, CODE_WRONG_SEQUENCE);
        assert!(check.log.contains("expected 6, got 5"));
        assert_eq!(chain.accepted().len(), 1);
        assert_eq!(chain.submissions().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_tampered_signature() {
        let (chain, bytes, _) = signed_bytes(5);
        let config = DefaultTxConfig::default();
        let mut envelope = config.decode(&bytes).unwrap();
        envelope.body.memo = "tampered".to_string();
        let tampered = config.encode(&envelope).unwrap();
        let response = chain.submit(&tampered, BroadcastMode::Sync).await.unwrap();
        assert_eq!(response.check.unwrap().code, 4);
    }

    #[tokio::test]
    async fn test_size_limit_and_simulation() {
        let (chain, bytes, _) = signed_bytes(5);
        assert_eq!(chain.simulate(&bytes).await.unwrap().gas_used, 2 * GAS_PER_MSG);
        chain.set_max_msgs_per_tx(1);
        let response = chain.submit(&bytes, BroadcastMode::Commit).await.unwrap();
        assert_eq!(response.deliver.unwrap().code, CODE_TX_TOO_LARGE);
        assert!(chain.submit(b"garbage", BroadcastMode::Sync).await.is_err());
    }

    #[tokio::test]
    async fn test_query_account() {
        let (chain, _, address) = signed_bytes(5);
        let info = chain.query_account(&address).await.unwrap();
        assert_eq!((info.account_number, info.sequence), (1, 5));
        assert!(matches!(
            chain.query_account("nobody").await,
            Err(RpcError::AccountNotFound { .. })
        ));
        assert_eq!(chain.query_count(), 2);
    }
}
