//! Broadcast pipeline
//!
//! - **coordinator**: lock, build, sign, submit and retry on stale sequences
//! - **batch**: sequential chunked sends with adaptive chunk sizes

pub mod batch;
pub mod coordinator;

pub use batch::{BatchCursor, BatchError, BatchSplitter};
pub use coordinator::BroadcastCoordinator;
