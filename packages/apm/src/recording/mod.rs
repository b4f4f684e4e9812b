// packages/apm/src/recording/mod.rs
//! Span recording
//!
//! - **Span**: the record produced by every traced call
//! - **Sink**: where wrappers hand finished spans
//! - **Span Queue**: lock-free bounded buffer drained by the host agent
//!
//! ```text
//! wrapper ──► SpanSink::record() ──► SpanQueue (drop on full) ──► host agent
//!                                └─► LogSink (tracing events)
//! ```

pub mod sink;
pub mod span;
pub mod span_queue;

pub use sink::{LogSink, PendingSpan, SpanSink};
pub use span::SpanRecord;
pub use span_queue::{QueueStats, SpanQueue};
