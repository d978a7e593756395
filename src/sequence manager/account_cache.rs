//! TTL cache of account number and next sequence per address
//!
//! The cache avoids a live account query before every send. Entries are
//! refreshed on a miss, advanced after every accepted transaction and dropped
//! when the chain reports a sequence mismatch. Per-address consistency is not
//! the cache's job; callers hold the address's lock shard around
//! read-build-submit-record.

use crate::metrics::Metrics;
use crate::rpc_manager::AccountQuerier;
use crate::tx_builder::errors::PipelineResult;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Entry lifetime used when none is configured
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Cached view of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub address: String,
    pub account_number: u64,
    /// Next sequence to sign with
    pub sequence: u64,
    pub fetched_at: Instant,
}

impl AccountState {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

/// Concurrent account-state cache in front of an [`AccountQuerier`]
pub struct AccountSequenceCache {
    entries: DashMap<String, AccountState>,
    ttl: Duration,
    querier: Arc<dyn AccountQuerier>,
    metrics: Arc<Metrics>,
}

impl AccountSequenceCache {
    pub fn new(ttl: Duration, querier: Arc<dyn AccountQuerier>, metrics: Arc<Metrics>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            querier,
            metrics,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached state if present and younger than the TTL
    ///
    /// An expired entry is evicted and reported as a miss.
    pub fn get(&self, address: &str) -> Option<AccountState> {
        let ttl = self.ttl;
        if let Some(entry) = self.entries.get(address) {
            if !entry.is_expired(ttl) {
                return Some(entry.clone());
            }
        }
        // the read guard above must be gone before touching the shard again
        if self
            .entries
            .remove_if(address, |_, state| state.is_expired(ttl))
            .is_some()
        {
            debug!(address, "account state expired");
        }
        None
    }

    /// Query the chain and overwrite the entry
    ///
    /// On failure the error is returned as is and the cache is left untouched.
    pub async fn refresh(&self, address: &str) -> PipelineResult<AccountState> {
        let info = self.querier.query_account(address).await.map_err(|e| {
            warn!(address, error = %e, "account query failed");
            e
        })?;
        let state = AccountState {
            address: address.to_string(),
            account_number: info.account_number,
            sequence: info.sequence,
            fetched_at: Instant::now(),
        };
        self.entries.insert(address.to_string(), state.clone());
        debug!(
            address,
            account_number = state.account_number,
            sequence = state.sequence,
            "account state refreshed"
        );
        Ok(state)
    }

    /// Cached state, or exactly one live query on a miss
    pub async fn get_or_refresh(&self, address: &str) -> PipelineResult<AccountState> {
        if let Some(state) = self.get(address) {
            self.metrics.sequence_cache_hits.inc();
            return Ok(state);
        }
        self.metrics.sequence_cache_misses.inc();
        self.refresh(address).await
    }

    /// Drop the entry for `address`
    pub fn invalidate(&self, address: &str) {
        if self.entries.remove(address).is_some() {
            debug!(address, "account state invalidated");
        }
    }

    /// Advance the entry after a transaction signed with `used_sequence` was
    /// accepted
    ///
    /// Keeps the account number and restarts the TTL. Returns `false` when there
    /// was no entry to update; the next send then refreshes.
    pub fn record_success(&self, address: &str, used_sequence: u64) -> bool {
        match self.entries.get_mut(address) {
            Some(mut entry) => {
                entry.sequence = used_sequence + 1;
                entry.fetched_at = Instant::now();
                debug!(address, next_sequence = entry.sequence, "sequence advanced");
                true
            }
            None => {
                debug!(address, used_sequence, "no cached state to advance");
                false
            }
        }
    }

    /// Number of entries, expired ones included until they are next read
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
