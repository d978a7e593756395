//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Per-client metrics registry
///
/// Each client owns its own [`Registry`], so several clients can live in one
/// process without colliding on metric names.
pub struct Metrics {
    registry: Registry,

    // Counters
    pub txs_sent: IntCounter,
    pub txs_failed: IntCounter,
    pub sequence_conflicts: IntCounter,
    pub sequence_cache_hits: IntCounter,
    pub sequence_cache_misses: IntCounter,
    pub batch_halvings: IntCounter,

    // Gauges
    pub held_shards: IntGauge,

    // Histograms
    pub build_latency: Histogram,
    pub broadcast_latency: Histogram,
    pub shard_hold_time: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let txs_sent = IntCounter::with_opts(Opts::new(
            "txs_sent_total",
            "Number of transactions accepted by the chain",
        ))?;

        let txs_failed = IntCounter::with_opts(Opts::new(
            "txs_failed_total",
            "Number of sends that ended in an error",
        ))?;

        let sequence_conflicts = IntCounter::with_opts(Opts::new(
            "sequence_conflicts_total",
            "Number of sequence mismatches reported by the chain",
        ))?;

        let sequence_cache_hits = IntCounter::with_opts(Opts::new(
            "sequence_cache_hits_total",
            "Account state served from the cache",
        ))?;

        let sequence_cache_misses = IntCounter::with_opts(Opts::new(
            "sequence_cache_misses_total",
            "Account state fetched from the chain",
        ))?;

        let batch_halvings = IntCounter::with_opts(Opts::new(
            "batch_halvings_total",
            "Number of times a batch chunk size was halved",
        ))?;

        let held_shards = IntGauge::with_opts(Opts::new(
            "sequence_held_shards",
            "Number of account lock shards currently held",
        ))?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Transaction build and sign latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.02, 0.05, 0.1]),
        )?;

        let broadcast_latency = Histogram::with_opts(
            HistogramOpts::new("broadcast_latency_seconds", "Latency of a full send")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        let shard_hold_time = Histogram::with_opts(
            HistogramOpts::new(
                "sequence_shard_hold_seconds",
                "Duration account lock shards are held",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(txs_sent.clone()))?;
        registry.register(Box::new(txs_failed.clone()))?;
        registry.register(Box::new(sequence_conflicts.clone()))?;
        registry.register(Box::new(sequence_cache_hits.clone()))?;
        registry.register(Box::new(sequence_cache_misses.clone()))?;
        registry.register(Box::new(batch_halvings.clone()))?;
        registry.register(Box::new(held_shards.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(broadcast_latency.clone()))?;
        registry.register(Box::new(shard_hold_time.clone()))?;

        Ok(Self {
            registry,
            txs_sent,
            txs_failed,
            sequence_conflicts,
            sequence_cache_hits,
            sequence_cache_misses,
            batch_halvings,
            held_shards,
            build_latency,
            broadcast_latency,
            shard_hold_time,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
