//! Adaptive batch splitting
//!
//! A long message list is sent as a sequence of transactions, one chunk at a
//! time and in order, since every chunk consumes the next sequence of the same
//! account. When a chunk turns out too large the chunk size is halved and the
//! send resumes at the same position. The size only ever shrinks within one
//! call.

use super::coordinator::BroadcastCoordinator;
use crate::metrics::Metrics;
use crate::observability::TraceContext;
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::envelope::BoxedMsg;
use crate::tx_builder::errors::TxError;
use crate::types::{BaseTx, ResultTx};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// Early termination of a batch; accepted chunks are kept in `completed`
#[derive(Debug, Clone, Error)]
#[error("batch stopped after {} accepted transaction(s): {source}", .completed.len())]
pub struct BatchError {
    pub completed: Vec<ResultTx>,
    pub source: TxError,
}

/// Position and current chunk size within a message list
#[derive(Debug)]
pub struct BatchCursor<'a, T> {
    remaining: &'a [T],
    position: usize,
    batch_size: usize,
}

impl<'a, T> BatchCursor<'a, T> {
    /// Cursor over `items`; a batch size of zero is treated as one
    pub fn new(items: &'a [T], batch_size: usize) -> Self {
        Self {
            remaining: items,
            position: 0,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Index of the first unsent item
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_done(&self) -> bool {
        self.remaining.is_empty()
    }

    /// The chunk that would be sent next
    pub fn next_chunk(&self) -> Option<&'a [T]> {
        if self.remaining.is_empty() {
            return None;
        }
        let end = self.batch_size.min(self.remaining.len());
        Some(&self.remaining[..end])
    }

    /// Mark the current chunk as sent
    pub fn advance(&mut self) {
        let step = self.batch_size.min(self.remaining.len());
        self.remaining = &self.remaining[step..];
        self.position += step;
    }

    /// Halve the chunk size; returns `false` when it is already one
    pub fn halve(&mut self) -> bool {
        if self.batch_size <= 1 {
            return false;
        }
        self.batch_size /= 2;
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Sends long message lists as consecutive transactions
pub struct BatchSplitter {
    coordinator: Arc<BroadcastCoordinator>,
    max_batch_size: usize,
    metrics: Arc<Metrics>,
}

impl BatchSplitter {
    pub fn new(coordinator: Arc<BroadcastCoordinator>, max_batch_size: usize) -> Self {
        let metrics = coordinator.metrics().clone();
        Self {
            coordinator,
            max_batch_size,
            metrics,
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Send `msgs` in chunks through the coordinator
    ///
    /// A too-large chunk halves the chunk size and is retried from the same
    /// position; at size one it ends the batch. Any other error, or a panic
    /// while sending a chunk, ends the batch too. An empty list sends nothing.
    pub async fn send_batch(&self, msgs: &[BoxedMsg], base: &BaseTx) -> Result<Vec<ResultTx>, BatchError> {
        let trace = TraceContext::new("send_batch");
        let logger = StructuredLogger::for_trace(&trace);
        let mut cursor = BatchCursor::new(msgs, self.max_batch_size);
        let mut completed = Vec::new();

        while let Some(chunk) = cursor.next_chunk() {
            let child = trace.child_span("build_and_send");
            let outcome = AssertUnwindSafe(self.coordinator.build_and_send_traced(chunk, base, &child))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(result)) => {
                    completed.push(result);
                    cursor.advance();
                }
                Ok(Err(err)) if err.is_too_large() => {
                    let from = cursor.batch_size();
                    if !cursor.halve() {
                        return Err(BatchError {
                            completed,
                            source: err,
                        });
                    }
                    self.metrics.batch_halvings.inc();
                    logger.log_batch_halving(from, cursor.batch_size(), cursor.position());
                }
                Ok(Err(err)) => {
                    return Err(BatchError {
                        completed,
                        source: err,
                    })
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    logger.error(&format!("chunk send panicked: {}", message));
                    return Err(BatchError {
                        completed,
                        source: TxError::internal(format!("chunk send panicked: {}", message)),
                    });
                }
            }
        }

        logger.log_batch_complete(completed.len(), msgs.len());
        Ok(completed)
    }
}
