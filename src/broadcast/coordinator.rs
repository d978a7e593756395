//! Build-and-send state machine
//!
//! One send walks `LOCKED -> BUILT -> SUBMITTED` and ends in success, a
//! retry after a stale sequence, or a fatal error:
//!
//! - the sender's lock shard is held from before the account state is read
//!   until after the cache is advanced, so sends of one account are totally
//!   ordered by sequence;
//! - a sequence conflict invalidates the cached state and rebuilds with a
//!   freshly queried sequence, up to `max_attempts` submissions;
//! - every other error is returned as is.

use crate::config::ClientConfig;
use crate::metrics::{Metrics, Timer};
use crate::observability::TraceContext;
use crate::rpc_manager::{classify_tx_result, BroadcastTransport};
use crate::sequence_manager::{AccountSequenceCache, AccountState, ShardedLocker};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::envelope::BoxedMsg;
use crate::tx_builder::errors::{PipelineResult, TxError};
use crate::tx_builder::factory::TxFactory;
use crate::tx_builder::fee::{adjust_gas, Coins, DecCoins};
use crate::tx_builder::output::SignedTx;
use crate::tx_builder::codec::TxConfig;
use crate::types::{BaseTx, BroadcastMode, BroadcastResponse, ResultTx};
use crate::wallet::KeyManager;
use std::sync::Arc;
use tracing::{debug, Instrument};

/// Per-call parameters after merging [`BaseTx`] over the client configuration
#[derive(Debug, Clone)]
struct SendParams {
    key_name: String,
    address: String,
    password: String,
    gas: u64,
    gas_adjustment: f64,
    fees: Coins,
    gas_prices: DecCoins,
    mode: BroadcastMode,
    memo: String,
    simulate: bool,
}

/// Serializes, builds, submits and retries sends per sending account
pub struct BroadcastCoordinator {
    config: Arc<ClientConfig>,
    cache: Arc<AccountSequenceCache>,
    locker: Arc<ShardedLocker>,
    transport: Arc<dyn BroadcastTransport>,
    keys: Arc<dyn KeyManager>,
    tx_config: Arc<dyn TxConfig>,
    metrics: Arc<Metrics>,
}

impl BroadcastCoordinator {
    pub fn new(
        config: Arc<ClientConfig>,
        cache: Arc<AccountSequenceCache>,
        locker: Arc<ShardedLocker>,
        transport: Arc<dyn BroadcastTransport>,
        keys: Arc<dyn KeyManager>,
        tx_config: Arc<dyn TxConfig>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            cache,
            locker,
            transport,
            keys,
            tx_config,
            metrics,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &AccountSequenceCache {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Build, sign and submit `msgs` as one transaction
    pub async fn build_and_send(&self, msgs: &[BoxedMsg], base: &BaseTx) -> PipelineResult<ResultTx> {
        let trace = TraceContext::new("build_and_send");
        self.build_and_send_traced(msgs, base, &trace).await
    }

    /// [`Self::build_and_send`] under an existing trace context
    pub async fn build_and_send_traced(
        &self,
        msgs: &[BoxedMsg],
        base: &BaseTx,
        trace: &TraceContext,
    ) -> PipelineResult<ResultTx> {
        let logger = StructuredLogger::for_trace(trace);
        let timer = Timer::new();
        let send = self.send_locked(msgs, base, &logger).instrument(trace.span());

        let outcome = match self.config.send_timeout() {
            Some(limit) => match tokio::time::timeout(limit, send).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TxError::Transport(format!(
                    "send timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => send.await,
        };

        timer.observe_duration(&self.metrics.broadcast_latency);
        let latency_ms = (timer.elapsed_secs() * 1000.0) as u64;
        match &outcome {
            Ok(result) => {
                self.metrics.txs_sent.inc();
                logger.log_send_success(&base.from, &result.hash, result.sequence, latency_ms);
            }
            Err(err) => {
                self.metrics.txs_failed.inc();
                logger.log_send_failure(&base.from, &err.to_string(), err.category(), latency_ms);
            }
        }
        outcome
    }

    /// Deterministic hash of the transaction `build_and_send` would submit
    ///
    /// Nothing is submitted. The sender's shard is held while the account
    /// state is read, so a refresh issued here cannot overwrite the state a
    /// concurrent send has just advanced.
    pub async fn build_tx_hash(&self, msgs: &[BoxedMsg], base: &BaseTx) -> PipelineResult<String> {
        let params = self.resolve(base)?;
        let state = self.account_state(&params.address).await?;
        let signed = self.factory(&params, &state, params.gas).build_signed(&params.key_name, msgs)?;
        Ok(signed.hash().to_string())
    }

    /// Cached account state, refreshed under the account's shard on a miss
    pub async fn account_state(&self, address: &str) -> PipelineResult<AccountState> {
        let _guard = self.locker.lock(address).await;
        self.cache.get_or_refresh(address).await
    }

    async fn send_locked(
        &self,
        msgs: &[BoxedMsg],
        base: &BaseTx,
        logger: &StructuredLogger,
    ) -> PipelineResult<ResultTx> {
        let params = self.resolve(base)?;
        let _guard = self.locker.lock(&params.address).await;

        let max_attempts = self.config.sequence.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let state = self.cache.get_or_refresh(&params.address).await?;
            logger.log_send_attempt(&params.address, state.sequence, attempt, msgs.len());

            match self.attempt(&params, msgs, &state).await {
                Ok(result) => {
                    self.cache.record_success(&params.address, state.sequence);
                    return Ok(result);
                }
                Err(err) if err.is_retryable() => {
                    self.cache.invalidate(&params.address);
                    self.metrics.sequence_conflicts.inc();
                    let expected = match &err {
                        TxError::SequenceConflict { expected, .. } => *expected,
                        _ => None,
                    };
                    logger.log_sequence_conflict(&params.address, state.sequence, expected, attempt);
                    if attempt >= max_attempts {
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One pass of BUILT -> SUBMITTED with the given account state
    async fn attempt(
        &self,
        params: &SendParams,
        msgs: &[BoxedMsg],
        state: &AccountState,
    ) -> PipelineResult<ResultTx> {
        let gas = if params.simulate {
            self.simulate_gas(params, msgs, state).await?
        } else {
            params.gas
        };

        let timer = Timer::new();
        let signed = self.factory(params, state, gas).build_signed(&params.key_name, msgs)?;
        timer.observe_duration(&self.metrics.build_latency);

        let limit = self.config.batch.max_tx_bytes;
        if signed.len() > limit {
            debug!(size = signed.len(), limit, msgs = msgs.len(), "transaction over size limit");
            return Err(TxError::exceeds_limit(signed.len(), limit));
        }

        let response = self.transport.submit(signed.bytes(), params.mode).await?;
        if let Err(err) = Self::check_response(&response, params.mode, signed.len()) {
            if Self::failed_after_admission(&response, params.mode) {
                // the chain consumed the sequence even though execution failed
                self.cache.invalidate(&params.address);
            }
            return Err(err);
        }
        Ok(Self::result(&response, &signed, state.sequence, msgs.len(), params.mode))
    }

    async fn simulate_gas(
        &self,
        params: &SendParams,
        msgs: &[BoxedMsg],
        state: &AccountState,
    ) -> PipelineResult<u64> {
        let probe = self.factory(params, state, params.gas).build_signed(&params.key_name, msgs)?;
        let simulated = self.transport.simulate(probe.bytes()).await?;
        let gas = adjust_gas(simulated.gas_used, params.gas_adjustment);
        debug!(
            gas_used = simulated.gas_used,
            adjustment = params.gas_adjustment,
            gas,
            "simulated gas"
        );
        Ok(gas)
    }

    fn check_response(response: &BroadcastResponse, mode: BroadcastMode, size: usize) -> PipelineResult<()> {
        match mode {
            BroadcastMode::Async => Ok(()),
            BroadcastMode::Sync => match &response.check {
                Some(check) => classify_tx_result(check, size),
                None => Ok(()),
            },
            BroadcastMode::Commit => {
                if let Some(check) = &response.check {
                    classify_tx_result(check, size)?;
                }
                match &response.deliver {
                    Some(deliver) => classify_tx_result(deliver, size),
                    None => Err(TxError::Transport(
                        "commit broadcast returned no execution result".to_string(),
                    )),
                }
            }
        }
    }

    /// `Commit` response whose check passed but whose execution failed
    fn failed_after_admission(response: &BroadcastResponse, mode: BroadcastMode) -> bool {
        mode == BroadcastMode::Commit
            && response.check.as_ref().map_or(true, |check| check.is_ok())
            && response.deliver.as_ref().is_some_and(|deliver| !deliver.is_ok())
    }

    fn result(
        response: &BroadcastResponse,
        signed: &SignedTx,
        sequence: u64,
        msg_count: usize,
        mode: BroadcastMode,
    ) -> ResultTx {
        let exec = response.deliver.as_ref().or(response.check.as_ref());
        ResultTx {
            hash: if response.hash.is_empty() {
                signed.hash().to_string()
            } else {
                response.hash.clone()
            },
            height: response.height,
            gas_wanted: exec.map(|r| r.gas_wanted).unwrap_or_default(),
            gas_used: exec.map(|r| r.gas_used).unwrap_or_default(),
            sequence,
            msg_count,
            mode,
        }
    }

    fn factory(&self, params: &SendParams, state: &AccountState, gas: u64) -> TxFactory {
        TxFactory::new()
            .with_chain_id(self.config.chain_id.clone())
            .with_address(params.address.clone())
            .with_account_number(state.account_number)
            .with_sequence(state.sequence)
            .with_gas(gas)
            .with_gas_adjustment(params.gas_adjustment)
            .with_fee(params.fees.clone())
            .with_gas_prices(params.gas_prices.clone())
            .with_memo(params.memo.clone())
            .with_mode(params.mode)
            .with_password(params.password.clone())
            .with_sign_mode(self.config.sign_mode)
            .with_tx_config(self.tx_config.clone())
            .with_key_manager(self.keys.clone())
    }

    /// Merge `base` over the client configuration
    fn resolve(&self, base: &BaseTx) -> PipelineResult<SendParams> {
        if base.from.is_empty() {
            return Err(TxError::config("base tx has no sender key"));
        }
        let key = self.keys.find(&base.from)?;

        let (fees, gas_prices) = if base.fee.is_some() || base.gas_prices.is_some() {
            let fees = match &base.fee {
                Some(fee) => Coins::parse(fee)?,
                None => Coins::default(),
            };
            let gas_prices = match &base.gas_prices {
                Some(prices) => DecCoins::parse(prices)?,
                None => DecCoins::default(),
            };
            (fees, gas_prices)
        } else {
            self.config.fee_spec()?
        };

        Ok(SendParams {
            key_name: base.from.clone(),
            address: key.address,
            password: base.password.clone(),
            gas: base.gas.unwrap_or(self.config.gas),
            gas_adjustment: base.gas_adjustment.unwrap_or(self.config.gas_adjustment),
            fees,
            gas_prices,
            mode: base.mode.unwrap_or(self.config.mode),
            memo: base.memo.clone(),
            simulate: base.simulate_and_execute,
        })
    }
}
