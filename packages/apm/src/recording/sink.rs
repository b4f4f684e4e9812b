// packages/apm/src/recording/sink.rs
//! Span sinks
//!
//! Shipping spans to a collector belongs to the host agent; the wrappers only
//! need somewhere to hand finished spans.

use crate::observability::metrics;
use crate::recording::span::SpanRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Destination for finished spans
pub trait SpanSink: Send + Sync {
    fn record(&self, span: SpanRecord);
}

impl<T: SpanSink + ?Sized> SpanSink for Arc<T> {
    fn record(&self, span: SpanRecord) {
        (**self).record(span)
    }
}

/// Emits one structured log event per span
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl SpanSink for LogSink {
    fn record(&self, span: SpanRecord) {
        let attributes = serde_json::to_string(&span.attributes).unwrap_or_default();

        match &span.error {
            Some(error) => warn!(
                span_id = %span.id,
                name = %span.name(),
                elapsed_us = span.elapsed_us,
                attributes = %attributes,
                error = %error,
                "span finished with error"
            ),
            None => info!(
                span_id = %span.id,
                name = %span.name(),
                elapsed_us = span.elapsed_us,
                attributes = %attributes,
                "span finished"
            ),
        }

        metrics::span_recorded();
    }
}

/// Span of an in-flight call that reaches its sink however the call ends
///
/// Dropped before [`PendingSpan::close`], for example when the caller gives up
/// on a future, the span is recorded with `cancelled = true`.
pub struct PendingSpan {
    span: Option<SpanRecord>,
    started: Instant,
    sink: Arc<dyn SpanSink>,
}

impl PendingSpan {
    /// Track `span`, started at `started`, until it closes
    pub fn new(span: SpanRecord, started: Instant, sink: Arc<dyn SpanSink>) -> Self {
        Self {
            span: Some(span),
            started,
            sink,
        }
    }

    /// Mutate the open span
    pub fn annotate<F: FnOnce(&mut SpanRecord)>(&mut self, f: F) {
        if let Some(span) = self.span.as_mut() {
            f(span);
        }
    }

    /// Finish the span and hand it to the sink
    pub fn close(mut self) {
        self.record(false);
    }

    fn record(&mut self, cancelled: bool) {
        if let Some(mut span) = self.span.take() {
            if cancelled {
                span.set_attribute("cancelled", "true");
            }
            span.finish(self.started.elapsed());
            self.sink.record(span);
        }
    }
}

impl Drop for PendingSpan {
    fn drop(&mut self) {
        self.record(true);
    }
}
