// packages/apm/src/recording/span_queue.rs
//! Lock-free MPMC span queue
//!
//! Bounded buffer between instrumented call sites and whatever the host agent
//! uses to ship spans. Pushing never blocks; a full queue drops the span.

use crate::observability::metrics;
use crate::recording::sink::SpanSink;
use crate::recording::span::SpanRecord;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free span queue
pub struct SpanQueue {
    /// Underlying bounded queue
    queue: ArrayQueue<SpanRecord>,

    /// Push counter
    push_count: AtomicU64,

    /// Pop counter
    pop_count: AtomicU64,

    /// Drop counter (queue full)
    drop_count: AtomicU64,
}

impl SpanQueue {
    /// Create a new span queue; `capacity` must be non-zero
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
        }
    }

    /// Push a span (non-blocking, lock-free)
    pub fn push(&self, span: SpanRecord) -> Result<(), SpanRecord> {
        match self.queue.push(span) {
            Ok(_) => {
                self.push_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(span) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
                Err(span)
            }
        }
    }

    /// Try to pop a span (non-blocking)
    pub fn try_pop(&self) -> Option<SpanRecord> {
        let span = self.queue.pop()?;
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(span)
    }

    /// Pop everything currently buffered
    pub fn drain(&self) -> Vec<SpanRecord> {
        std::iter::from_fn(|| self.try_pop()).collect()
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if queue is full
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Get current queue size
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Get queue capacity
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl SpanSink for SpanQueue {
    fn record(&self, span: SpanRecord) {
        match self.push(span) {
            Ok(()) => metrics::span_recorded(),
            Err(span) => metrics::span_dropped(&span.library),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Spans accepted
    pub push_count: u64,

    /// Spans handed out
    pub pop_count: u64,

    /// Spans dropped (queue full)
    pub drop_count: u64,

    pub current_size: usize,
    pub capacity: usize,
}

impl QueueStats {
    /// Queue fill percentage
    pub fn fill_percentage(&self) -> f64 {
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }

    /// Dropped spans as a percentage of all spans offered
    pub fn drop_rate(&self) -> f64 {
        let offered = self.push_count + self.drop_count;
        if offered == 0 {
            0.0
        } else {
            (self.drop_count as f64 / offered as f64) * 100.0
        }
    }
}
