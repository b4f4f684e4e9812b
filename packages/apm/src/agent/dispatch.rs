// packages/apm/src/agent/dispatch.rs
//! Flag-driven plugin dispatch
//!
//! Integration shims call [`Dispatcher::dispatch`] with one boolean per
//! optional library. For every flag that is on, the plugin registered as
//! `<namespace>.<name>` is resolved, its library probed, and its guarded
//! `monkey_patch` run. No failure stops the remaining flags.

use crate::agent::catalog::PluginCatalog;
use crate::agent::environment::ProbeReport;
use crate::agent::plugin::PatchContext;
use crate::interception::once::{Guarded, PluginState};
use crate::utils::config::PatchFlags;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What dispatch did with one flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Flag was off
    Disabled,

    /// No plugin module under that name
    Unresolved { reason: String },

    /// The plugin's guarded `monkey_patch` was invoked
    Attempted {
        state: PluginState,

        /// The patch body ran on this dispatch
        fresh: bool,
    },
}

/// Per-flag outcomes of one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub namespace: String,
    pub outcomes: BTreeMap<String, DispatchOutcome>,
    pub probe: ProbeReport,
}

impl DispatchReport {
    /// Outcome for one flag, if it was in the dispatched set
    pub fn outcome(&self, name: &str) -> Option<&DispatchOutcome> {
        self.outcomes.get(name)
    }

    /// Plugins that ended up patched
    pub fn patched(&self) -> Vec<&str> {
        self.with_state(PluginState::Patched)
    }

    /// Plugins skipped for a missing library
    pub fn skipped(&self) -> Vec<&str> {
        self.with_state(PluginState::SkippedMissingDependency)
    }

    /// Flags whose plugin was invoked, whatever the result
    pub fn attempted(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, DispatchOutcome::Attempted { .. }))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn with_state(&self, wanted: PluginState) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, DispatchOutcome::Attempted { state, .. } if *state == wanted))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Resolves flags to plugins and runs them against one patch context
#[derive(Clone)]
pub struct Dispatcher {
    catalog: Arc<PluginCatalog>,
    context: Arc<PatchContext>,
}

impl Dispatcher {
    /// Create a dispatcher over a catalog and patch context
    pub fn new(catalog: Arc<PluginCatalog>, context: Arc<PatchContext>) -> Self {
        Self { catalog, context }
    }

    /// Plugins this dispatcher resolves from
    pub fn catalog(&self) -> &Arc<PluginCatalog> {
        &self.catalog
    }

    /// Context every plugin patches in
    pub fn context(&self) -> &Arc<PatchContext> {
        &self.context
    }

    /// Run the plugin behind every enabled flag in `namespace`
    pub fn dispatch(&self, namespace: &str, flags: &PatchFlags) -> DispatchReport {
        let mut outcomes = BTreeMap::new();
        let mut probe = ProbeReport::default();

        for (name, enabled) in flags.iter() {
            if !enabled {
                debug!("Plugin {}.{} disabled by flag", namespace, name);
                outcomes.insert(name.to_string(), DispatchOutcome::Disabled);
                continue;
            }

            let plugin = match self.catalog.resolve(namespace, name) {
                Ok(plugin) => plugin,
                Err(e) => {
                    warn!("Skipping {}.{}: {}", namespace, name, e);
                    outcomes.insert(name.to_string(), DispatchOutcome::Unresolved { reason: e.to_string() });
                    continue;
                }
            };

            let info = plugin.info();
            let availability = self.context.environment().probe(&info.library);
            probe.versions.insert(
                info.library.clone(),
                availability.module().map(|m| m.version().to_string()),
            );

            let guarded = plugin.monkey_patch(&self.context, &availability);
            match guarded {
                Guarded::Ran(PluginState::Patched) => {
                    info!("Installed {}.{} plugin v{}", namespace, name, info.version);
                }
                Guarded::AlreadyApplied(state) => {
                    debug!("Plugin {}.{} already settled: {:?}", namespace, name, state);
                }
                Guarded::Ran(_) => {}
            }

            outcomes.insert(
                name.to_string(),
                DispatchOutcome::Attempted {
                    state: guarded.state(),
                    fresh: guarded.ran(),
                },
            );
        }

        DispatchReport {
            namespace: namespace.to_string(),
            outcomes,
            probe,
        }
    }
}
