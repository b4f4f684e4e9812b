// packages/apm/src/interception/once.rs
//! Idempotency guard for patch routines
//!
//! Several integration shims may try to patch the same library. The registry
//! records every patch routine by identifier and runs each body at most once per
//! process. Concurrent first-time callers block on the same cell until the first
//! body finishes, then all of them observe its terminal state.
//!
//! A patch body must not re-enter the guard with its own identifier.

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

static GLOBAL_REGISTRY: Lazy<Arc<PatchRegistry>> = Lazy::new(|| Arc::new(PatchRegistry::new()));

/// Per-plugin patch lifecycle
///
/// ```text
/// Unattempted ──(library available)──► Patched
///      │
///      ├────(library missing)────────► SkippedMissingDependency
///      └────(target unresolvable)────► Failed
/// ```
///
/// Every state except `Unattempted` is terminal for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Unattempted,
    Patched,
    SkippedMissingDependency,
    Failed,
}

/// Outcome of a guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guarded {
    /// The body ran on this call
    Ran(PluginState),

    /// An earlier call already ran the body
    AlreadyApplied(PluginState),
}

impl Guarded {
    /// Settled state, whether or not this call ran the body
    pub fn state(&self) -> PluginState {
        match self {
            Guarded::Ran(state) | Guarded::AlreadyApplied(state) => *state,
        }
    }

    /// Check if the body ran on this call
    pub fn ran(&self) -> bool {
        matches!(self, Guarded::Ran(_))
    }
}

/// Registry of applied patch routines
#[derive(Default)]
pub struct PatchRegistry {
    entries: DashMap<String, Arc<OnceCell<PluginState>>>,
}

impl PatchRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> Arc<PatchRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Run `patch` unless `id` has already run
    pub fn run_once<F>(&self, id: &str, patch: F) -> Guarded
    where
        F: FnOnce() -> PluginState,
    {
        // Clone the cell out so no map shard stays locked while the body runs
        let cell = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut ran = false;
        let state = *cell.get_or_init(|| {
            ran = true;
            patch()
        });

        if ran {
            debug!("Patch routine {} ran: {:?}", id, state);
            Guarded::Ran(state)
        } else {
            debug!("Patch routine {} already applied", id);
            Guarded::AlreadyApplied(state)
        }
    }

    /// Terminal state for `id`, or `Unattempted`
    pub fn state(&self, id: &str) -> PluginState {
        self.entries
            .get(id)
            .and_then(|cell| cell.get().copied())
            .unwrap_or(PluginState::Unattempted)
    }

    /// All settled routines, sorted by identifier
    pub fn applied(&self) -> Vec<(String, PluginState)> {
        let mut applied: Vec<(String, PluginState)> = self
            .entries
            .iter()
            .filter_map(|e| e.value().get().map(|state| (e.key().clone(), *state)))
            .collect();
        applied.sort_by(|a, b| a.0.cmp(&b.0));
        applied
    }
}

/// Run `patch` at most once per process under `id`
pub fn intercept_once<F>(id: &str, patch: F) -> Guarded
where
    F: FnOnce() -> PluginState,
{
    GLOBAL_REGISTRY.run_once(id, patch)
}
