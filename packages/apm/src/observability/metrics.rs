// packages/apm/src/observability/metrics.rs
//! Agent metrics
//!
//! Thin helpers over the `metrics` facade. Without an installed recorder they
//! are no-ops.

use ::metrics::{counter, describe_counter};

pub const PATCHES_APPLIED: &str = "apm_patches_applied_total";
pub const PLUGINS_SKIPPED: &str = "apm_plugins_skipped_total";
pub const PLUGINS_FAILED: &str = "apm_plugins_failed_total";
pub const SPANS_RECORDED: &str = "apm_spans_recorded_total";
pub const SPANS_DROPPED: &str = "apm_spans_dropped_total";

/// Register metric descriptions with the installed recorder
pub fn describe() {
    describe_counter!(PATCHES_APPLIED, "Plugins whose interceptors were enabled");
    describe_counter!(PLUGINS_SKIPPED, "Plugins skipped because their library is not installed");
    describe_counter!(PLUGINS_FAILED, "Plugins whose patch targets could not be resolved");
    describe_counter!(SPANS_RECORDED, "Spans handed to a sink");
    describe_counter!(SPANS_DROPPED, "Spans dropped by a full queue");
}

/// Count a successful patch
pub fn patch_applied(plugin: &str) {
    counter!(PATCHES_APPLIED, "plugin" => plugin.to_string()).increment(1);
}

/// Count a plugin skipped for a missing library
pub fn plugin_skipped(plugin: &str) {
    counter!(PLUGINS_SKIPPED, "plugin" => plugin.to_string()).increment(1);
}

/// Count a plugin that failed to patch
pub fn plugin_failed(plugin: &str) {
    counter!(PLUGINS_FAILED, "plugin" => plugin.to_string()).increment(1);
}

pub fn span_recorded() {
    counter!(SPANS_RECORDED).increment(1);
}

/// Count a span dropped on a full queue
pub fn span_dropped(library: &str) {
    counter!(SPANS_DROPPED, "library" => library.to_string()).increment(1);
}
