//! Trace and correlation ids attached to sends and batches

use std::fmt;
use uuid::Uuid;

/// Correlation id shared by every log event of one send or batch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ids of one traced pipeline operation
///
/// Every `build_and_send` gets its own context; chunks of a batch are child
/// contexts of the batch so their logs share a trace id.
#[derive(Debug, Clone)]
pub struct TraceContext {
    trace_id: Uuid,
    span_id: Uuid,
    parent_span_id: Option<Uuid>,
    correlation_id: CorrelationId,
    operation: &'static str,
}

impl TraceContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            correlation_id: CorrelationId::new(),
            operation,
        }
    }

    /// Context for a sub-operation: same trace and correlation id, new span
    pub fn child_span(&self, operation: &'static str) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            correlation_id: self.correlation_id.clone(),
            operation,
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn span_id(&self) -> Uuid {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<Uuid> {
        self.parent_span_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// A `tracing` span carrying the ids of this context
    pub fn span(&self) -> tracing::Span {
        let parent = self.parent_span_id.map(|id| id.to_string()).unwrap_or_default();
        tracing::info_span!(
            "tx",
            operation = self.operation,
            trace_id = %self.trace_id,
            span_id = %self.span_id,
            parent_span_id = %parent,
            correlation_id = %self.correlation_id,
        )
    }
}
