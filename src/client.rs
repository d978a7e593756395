//! Client facade
//!
//! [`TxClient`] wires the cache, the locker, the coordinator and the batch
//! splitter together from one [`ClientConfig`]. Module-level wrappers (bank,
//! staking, ...) build their messages and call into it.

use crate::broadcast::{BatchError, BatchSplitter, BroadcastCoordinator};
use crate::config::ClientConfig;
use crate::metrics::Metrics;
use crate::rpc_manager::{AccountQuerier, BroadcastTransport};
use crate::sequence_manager::{AccountSequenceCache, AccountState, ShardedLocker};
use crate::tx_builder::codec::TxConfig;
use crate::tx_builder::envelope::BoxedMsg;
use crate::tx_builder::errors::{PipelineResult, TxError};
use crate::tx_builder::factory::TxFactory;
use crate::types::{AccountInfo, BaseTx, ResultTx};
use crate::wallet::KeyManager;
use std::sync::Arc;
use tracing::info;

/// Entry point for building and broadcasting transactions
pub struct TxClient {
    config: Arc<ClientConfig>,
    querier: Arc<dyn AccountQuerier>,
    keys: Arc<dyn KeyManager>,
    tx_config: Arc<dyn TxConfig>,
    coordinator: Arc<BroadcastCoordinator>,
    batch: BatchSplitter,
    metrics: Arc<Metrics>,
}

impl TxClient {
    /// Validate `config` and assemble a client around the given collaborators
    pub fn new(
        config: ClientConfig,
        querier: Arc<dyn AccountQuerier>,
        transport: Arc<dyn BroadcastTransport>,
        keys: Arc<dyn KeyManager>,
        tx_config: Arc<dyn TxConfig>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let metrics = Arc::new(
            Metrics::new().map_err(|e| TxError::internal(format!("metrics registry: {}", e)))?,
        );

        let cache = Arc::new(AccountSequenceCache::new(
            config.cache_ttl(),
            querier.clone(),
            metrics.clone(),
        ));
        let locker = Arc::new(ShardedLocker::new(config.sequence.lock_shards)?.with_metrics(metrics.clone()));
        let coordinator = Arc::new(BroadcastCoordinator::new(
            config.clone(),
            cache,
            locker,
            transport,
            keys.clone(),
            tx_config.clone(),
            metrics.clone(),
        ));
        let batch = BatchSplitter::new(coordinator.clone(), config.batch.max_batch_size);

        info!(
            chain_id = %config.chain_id,
            mode = %config.mode,
            lock_shards = config.sequence.lock_shards,
            max_attempts = config.sequence.max_attempts,
            "transaction client ready"
        );

        Ok(Self {
            config,
            querier,
            keys,
            tx_config,
            coordinator,
            batch,
            metrics,
        })
    }

    /// Build, sign and broadcast `msgs` as a single transaction
    pub async fn build_and_send(&self, msgs: &[BoxedMsg], base: &BaseTx) -> PipelineResult<ResultTx> {
        self.coordinator.build_and_send(msgs, base).await
    }

    /// Broadcast `msgs` as consecutive transactions of at most
    /// `batch.max_batch_size` messages each
    pub async fn send_batch(&self, msgs: &[BoxedMsg], base: &BaseTx) -> Result<Vec<ResultTx>, BatchError> {
        self.batch.send_batch(msgs, base).await
    }

    /// Hash of the transaction that would be sent, without sending it
    pub async fn build_tx_hash(&self, msgs: &[BoxedMsg], base: &BaseTx) -> PipelineResult<String> {
        self.coordinator.build_tx_hash(msgs, base).await
    }

    /// Live account query, bypassing the cache
    pub async fn query_account(&self, address: &str) -> PipelineResult<AccountInfo> {
        Ok(self.querier.query_account(address).await?)
    }

    /// Cached account state, refreshed from the chain on a miss
    pub async fn account_state(&self, address: &str) -> PipelineResult<AccountState> {
        self.coordinator.account_state(address).await
    }

    /// A factory preloaded with the client's chain id, defaults and collaborators
    pub fn factory(&self) -> PipelineResult<TxFactory> {
        let (fees, gas_prices) = self.config.fee_spec()?;
        Ok(TxFactory::new()
            .with_chain_id(self.config.chain_id.clone())
            .with_gas(self.config.gas)
            .with_gas_adjustment(self.config.gas_adjustment)
            .with_fee(fees)
            .with_gas_prices(gas_prices)
            .with_mode(self.config.mode)
            .with_sign_mode(self.config.sign_mode)
            .with_tx_config(self.tx_config.clone())
            .with_key_manager(self.keys.clone()))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
