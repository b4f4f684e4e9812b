// packages/apm/src/plugins/common.rs
//! Generic trace plugin for fallible library calls

use crate::interception::wrapper::TracePlugin;
use crate::recording::span::SpanRecord;
use std::fmt::{Debug, Display};

/// Default cap on recorded argument text
pub const DEFAULT_MAX_ARG_LEN: usize = 256;

/// Records the call and marks `Err` returns as span errors.
///
/// Argument capture is off by default: arguments may carry credentials.
#[derive(Debug, Clone)]
pub struct CommonPlugin {
    capture_args: bool,
    max_arg_len: usize,
}

impl Default for CommonPlugin {
    fn default() -> Self {
        Self {
            capture_args: false,
            max_arg_len: DEFAULT_MAX_ARG_LEN,
        }
    }
}

impl CommonPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `Debug` output of the arguments, truncated to `max_len` bytes
    pub fn with_args(mut self, max_len: usize) -> Self {
        self.capture_args = true;
        self.max_arg_len = max_len;
        self
    }
}

/// Cut `text` to at most `max` bytes on a char boundary, marking the cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }

    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

impl<A, T, E> TracePlugin<A, Result<T, E>> for CommonPlugin
where
    A: Debug,
    E: Display,
{
    fn on_before(&self, span: &mut SpanRecord, args: &A) {
        if self.capture_args {
            span.set_attribute("args", truncate(&format!("{:?}", args), self.max_arg_len));
        }
    }

    fn on_end(&self, span: &mut SpanRecord, ret: &Result<T, E>) {
        if let Err(e) = ret {
            span.set_error(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(plugin: &CommonPlugin, ret: &Result<u8, String>) -> SpanRecord {
        let mut span = SpanRecord::start("lib", "api");
        TracePlugin::<(), Result<u8, String>>::on_end(plugin, &mut span, ret);
        span
    }

    #[test]
    fn test_err_marks_span() {
        let plugin = CommonPlugin::new();

        assert!(!end(&plugin, &Ok(1)).is_error());
        assert_eq!(end(&plugin, &Err("refused".into())).error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_args_not_captured_by_default() {
        let mut span = SpanRecord::start("lib", "api");
        TracePlugin::<&str, Result<(), String>>::on_before(&CommonPlugin::new(), &mut span, &"secret");

        assert_eq!(span.attribute("args"), None);
    }

    #[test]
    fn test_args_truncated() {
        let mut span = SpanRecord::start("lib", "api");
        let plugin = CommonPlugin::new().with_args(4);
        TracePlugin::<String, Result<(), String>>::on_before(&plugin, &mut span, &"abcdefgh".to_string());

        assert_eq!(span.attribute("args"), Some("\"abc..."));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate("héllo", 2), "h...");
        assert_eq!(truncate("short", 10), "short");
    }
}
