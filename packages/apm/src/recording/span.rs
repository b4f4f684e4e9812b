// packages/apm/src/recording/span.rs
//! Span record produced by every traced call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use ulid::Ulid;

/// One traced call of an instrumented library function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Unique span ID (ULID)
    pub id: String,

    /// Instrumented library (e.g. "psycopg2")
    pub library: String,

    /// Instrumented entry point (e.g. "connect")
    pub api: String,

    /// Wall-clock start time
    pub start_time: DateTime<Utc>,

    /// Elapsed time (microseconds)
    pub elapsed_us: u64,

    /// Plugin-supplied attributes
    pub attributes: BTreeMap<String, String>,

    /// Error message, when the call failed
    pub error: Option<String>,
}

impl SpanRecord {
    /// Open a span for `library.api` starting now
    pub fn start(library: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            library: library.into(),
            api: api.into(),
            start_time: Utc::now(),
            elapsed_us: 0,
            attributes: BTreeMap::new(),
            error: None,
        }
    }

    /// Set or overwrite an attribute
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Get an attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Mark the span as failed
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Check if the span is marked as failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Record the elapsed time
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_us = elapsed.as_micros() as u64;
    }

    /// `library.api`
    pub fn name(&self) -> String {
        format!("{}.{}", self.library, self.api)
    }
}
