//! Sequence Manager Module
//!
//! Account-sequence bookkeeping for concurrent senders: a TTL cache of account
//! number / next sequence, and a fixed set of lock shards that serializes
//! submissions per sending address.

pub mod account_cache;
pub mod sharded_lock;

// Re-exports for convenience
pub use account_cache::{AccountSequenceCache, AccountState, DEFAULT_CACHE_TTL};
pub use sharded_lock::{fnv1a_32, ShardGuard, ShardedLocker, DEFAULT_SHARD_COUNT};
