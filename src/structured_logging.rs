//! Structured logging for the send lifecycle

use crate::observability::TraceContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Structured logger for pipeline events
///
/// Every event carries the correlation id of the send (or batch) it belongs to.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
        }
    }

    pub fn for_trace(trace: &TraceContext) -> Self {
        Self::new(trace.correlation_id().to_string())
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_send_attempt(&self, address: &str, sequence: u64, attempt: u32, msg_count: usize) {
        tracing::debug!(
            context_id = %self.context_id,
            address = %address,
            sequence,
            attempt,
            msg_count,
            "Submitting transaction"
        );
    }

    pub fn log_send_success(&self, address: &str, hash: &str, sequence: u64, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            address = %address,
            hash = %hash,
            sequence,
            latency_ms,
            "Transaction accepted"
        );
    }

    pub fn log_send_failure(&self, address: &str, error: &str, category: &str, latency_ms: u64) {
        tracing::warn!(
            context_id = %self.context_id,
            address = %address,
            error = %error,
            category = %category,
            latency_ms,
            "Transaction failed"
        );
    }

    pub fn log_sequence_conflict(&self, address: &str, used: u64, expected: Option<u64>, attempt: u32) {
        tracing::warn!(
            context_id = %self.context_id,
            address = %address,
            used_sequence = used,
            expected_sequence = ?expected,
            attempt,
            "Sequence conflict, refreshing account state"
        );
    }

    pub fn log_batch_halving(&self, from: usize, to: usize, position: usize) {
        tracing::info!(
            context_id = %self.context_id,
            from,
            to,
            position,
            "Chunk too large, halving batch size"
        );
    }

    pub fn log_batch_complete(&self, chunks: usize, messages: usize) {
        tracing::info!(
            context_id = %self.context_id,
            chunks,
            messages,
            "Batch complete"
        );
    }

    pub fn error(&self, message: &str) {
        tracing::error!(
            context_id = %self.context_id,
            message = %message,
            "Error"
        );
    }
}

/// Install a global `tracing` subscriber
///
/// The filter comes from `RUST_LOG` and defaults to `info`. With `json` set,
/// events are written as JSON lines. Fails if a global subscriber is already
/// installed.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json().with_target(true)), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;
    Ok(())
}
