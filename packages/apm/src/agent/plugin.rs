// packages/apm/src/agent/plugin.rs
//! Plugin modules and the context they patch in
//!
//! A plugin module knows which entry points of one library to wrap and how.
//! Its `monkey_patch` is guarded by the patch registry, so however many shims
//! ask for it, the library is wrapped once.

use crate::agent::environment::{Availability, LibraryEnvironment};
use crate::interception::hook::LibraryModule;
use crate::interception::interceptor::Interception;
use crate::interception::once::{Guarded, PatchRegistry, PluginState};
use crate::interception::wrapper::panic_message;
use crate::observability::metrics;
use crate::recording::sink::SpanSink;
use crate::utils::errors::{ApmError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

/// Package metadata carried by each plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    /// Plugin name, also the flag key used to activate it
    pub name: String,

    /// Library the plugin instruments
    pub library: String,

    /// Semantic version of the plugin package
    pub version: String,

    pub authors: Vec<String>,
}

impl PluginInfo {
    /// Create metadata for a plugin of `library`
    pub fn new(name: impl Into<String>, library: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            version: version.into(),
            authors: Vec::new(),
        }
    }

    /// Add an author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    /// Identifier of the guarded patch routine
    pub fn patch_id(&self) -> String {
        format!("{}.monkey_patch", self.name)
    }
}

/// Everything a plugin needs while patching
pub struct PatchContext {
    environment: Arc<LibraryEnvironment>,
    registry: Arc<PatchRegistry>,
    sink: Arc<dyn SpanSink>,

    /// Interceptors owned for the rest of the process
    installed: Mutex<Vec<Box<dyn Interception>>>,
}

impl PatchContext {
    /// Context backed by the process-wide patch registry
    pub fn new(environment: Arc<LibraryEnvironment>, sink: Arc<dyn SpanSink>) -> Self {
        Self {
            environment,
            registry: PatchRegistry::global(),
            sink,
            installed: Mutex::new(Vec::new()),
        }
    }

    /// Use a private registry instead of the process-wide one
    pub fn with_registry(mut self, registry: Arc<PatchRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Libraries available for patching
    pub fn environment(&self) -> &Arc<LibraryEnvironment> {
        &self.environment
    }

    /// Registry guarding every `monkey_patch`
    pub fn registry(&self) -> &Arc<PatchRegistry> {
        &self.registry
    }

    /// Sink that wrappers hand finished spans to
    pub fn sink(&self) -> Arc<dyn SpanSink> {
        Arc::clone(&self.sink)
    }

    /// Keep enabled interceptors alive for the rest of the process
    pub fn retain(&self, interceptions: Vec<Box<dyn Interception>>) {
        self.installed.lock().extend(interceptions);
    }

    /// Qualified names of every enabled patch target
    pub fn installed_targets(&self) -> Vec<String> {
        self.installed
            .lock()
            .iter()
            .filter(|i| i.is_enabled())
            .map(|i| i.target_name())
            .collect()
    }

    /// Probe for the plugin's library and run its guarded `monkey_patch`
    pub fn patch(&self, plugin: &dyn PluginModule) -> Guarded {
        let availability = self.environment.probe(&plugin.info().library);
        plugin.monkey_patch(self, &availability)
    }
}

/// Per-library plugin adapter
pub trait PluginModule: Send + Sync {
    fn info(&self) -> PluginInfo;

    /// Build (but do not enable) the interceptors for an available library
    fn interceptors(&self, module: &Arc<LibraryModule>, ctx: &PatchContext) -> Result<Vec<Box<dyn Interception>>>;

    /// [`PluginModule::interceptors`] with a panicking plugin turned into an error
    fn build_interceptors(&self, module: &Arc<LibraryModule>, ctx: &PatchContext) -> Result<Vec<Box<dyn Interception>>> {
        panic::catch_unwind(AssertUnwindSafe(|| self.interceptors(module, ctx)))
            .unwrap_or_else(|payload| Err(ApmError::InterceptionFailed(panic_message(payload.as_ref()))))
    }

    /// Patch the library at most once per registry
    fn monkey_patch(&self, ctx: &PatchContext, availability: &Availability) -> Guarded {
        let info = self.info();

        ctx.registry().run_once(&info.patch_id(), || {
            let module = match availability.require(&info.library) {
                Ok(module) => module,
                Err(e) => {
                    info!("{}; skipping {} plugin", e, info.name);
                    metrics::plugin_skipped(&info.name);
                    return PluginState::SkippedMissingDependency;
                }
            };

            match self.build_interceptors(module, ctx).and_then(|i| enable_all(&i).map(|_| i)) {
                Ok(interceptions) => {
                    ctx.retain(interceptions);
                    metrics::patch_applied(&info.name);
                    PluginState::Patched
                }
                Err(e) => {
                    warn!("Plugin {} could not patch {}: {}", info.name, info.library, e);
                    metrics::plugin_failed(&info.name);
                    PluginState::Failed
                }
            }
        })
    }
}

/// Enable every interception in order, or none of them
///
/// A panicking wrapper factory unwinds the interceptions enabled before it.
fn enable_all(interceptions: &[Box<dyn Interception>]) -> Result<()> {
    for (index, interception) in interceptions.iter().enumerate() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| interception.enable())) {
            for enabled in interceptions[..index].iter().rev() {
                if let Err(e) = enabled.disable() {
                    warn!("Could not restore {}: {}", enabled.target_name(), e);
                }
            }
            return Err(ApmError::InterceptionFailed(format!(
                "enabling {}: {}",
                interception.target_name(),
                panic_message(payload.as_ref())
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::hook::Callable;
    use crate::interception::interceptor::{wrapper_fn, Interceptor};
    use crate::recording::span_queue::SpanQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps `clock.now` with a call counter
    struct ClockPlugin {
        calls: Arc<AtomicUsize>,
    }

    impl PluginModule for ClockPlugin {
        fn info(&self) -> PluginInfo {
            PluginInfo::new("clock", "clock", "0.1.0").with_author("tests@example.com")
        }

        fn interceptors(&self, module: &Arc<LibraryModule>, _ctx: &PatchContext) -> Result<Vec<Box<dyn Interception>>> {
            let calls = Arc::clone(&self.calls);
            let interceptor = Interceptor::new(
                module,
                "now",
                wrapper_fn(move |original: Callable<(), u64>| {
                    let calls = Arc::clone(&calls);
                    Arc::new(move |args: ()| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        original(args)
                    }) as Callable<(), u64>
                }),
            )?;
            Ok(vec![Box::new(interceptor) as Box<dyn Interception>])
        }
    }

    fn context(env: LibraryEnvironment) -> PatchContext {
        PatchContext::new(Arc::new(env), Arc::new(SpanQueue::new(16)))
            .with_registry(Arc::new(PatchRegistry::new()))
    }

    fn clock_module() -> Arc<LibraryModule> {
        let module = Arc::new(LibraryModule::new("clock", "1.0.0"));
        module.expose("now", |_: ()| 42u64);
        module
    }

    #[test]
    fn test_patch_wraps_once() {
        let module = clock_module();
        let ctx = context(LibraryEnvironment::new().with_library(Arc::clone(&module)));
        let calls = Arc::new(AtomicUsize::new(0));
        let plugin = ClockPlugin { calls: Arc::clone(&calls) };

        for _ in 0..5 {
            ctx.patch(&plugin);
        }

        assert_eq!(module.call::<(), u64>("now", ()).unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.installed_targets(), vec!["clock.now".to_string()]);
        assert_eq!(ctx.registry().state("clock.monkey_patch"), PluginState::Patched);
    }

    #[test]
    fn test_missing_library_is_skipped() {
        let ctx = context(LibraryEnvironment::new());
        let plugin = ClockPlugin {
            calls: Arc::new(AtomicUsize::new(0)),
        };

        let outcome = ctx.patch(&plugin);

        assert_eq!(outcome, Guarded::Ran(PluginState::SkippedMissingDependency));
        assert!(ctx.installed_targets().is_empty());
    }

    #[test]
    fn test_unresolvable_target_fails_without_patching() {
        let module = Arc::new(LibraryModule::new("clock", "1.0.0"));
        module.expose("now", |_: ()| "not a number".to_string());
        let ctx = context(LibraryEnvironment::new().with_library(Arc::clone(&module)));
        let plugin = ClockPlugin {
            calls: Arc::new(AtomicUsize::new(0)),
        };

        let outcome = ctx.patch(&plugin);

        assert_eq!(outcome.state(), PluginState::Failed);
        assert_eq!(module.call::<(), String>("now", ()).unwrap(), "not a number");
    }

    struct BrokenPlugin;

    impl PluginModule for BrokenPlugin {
        fn info(&self) -> PluginInfo {
            PluginInfo::new("broken", "clock", "0.1.0")
        }

        fn interceptors(&self, _module: &Arc<LibraryModule>, _ctx: &PatchContext) -> Result<Vec<Box<dyn Interception>>> {
            panic!("plugin bug")
        }
    }

    #[test]
    fn test_panicking_plugin_fails_once() {
        let ctx = context(LibraryEnvironment::new().with_library(clock_module()));

        assert_eq!(ctx.patch(&BrokenPlugin), Guarded::Ran(PluginState::Failed));
        assert_eq!(ctx.patch(&BrokenPlugin), Guarded::AlreadyApplied(PluginState::Failed));
    }

    /// Doubles `clock.now`, then wraps `clock.tick` with a factory that panics
    struct HalfPatchedPlugin;

    impl PluginModule for HalfPatchedPlugin {
        fn info(&self) -> PluginInfo {
            PluginInfo::new("half", "clock", "0.1.0")
        }

        fn interceptors(&self, module: &Arc<LibraryModule>, _ctx: &PatchContext) -> Result<Vec<Box<dyn Interception>>> {
            let doubling = Interceptor::new(
                module,
                "now",
                wrapper_fn(|original: Callable<(), u64>| {
                    Arc::new(move |args: ()| original(args) * 2) as Callable<(), u64>
                }),
            )?;
            let broken = Interceptor::new(
                module,
                "tick",
                wrapper_fn(|_original: Callable<(), u64>| -> Callable<(), u64> { panic!("factory bug") }),
            )?;
            Ok(vec![
                Box::new(doubling) as Box<dyn Interception>,
                Box::new(broken) as Box<dyn Interception>,
            ])
        }
    }

    #[test]
    fn test_panic_while_enabling_rolls_back() {
        let module = clock_module();
        module.expose("tick", |_: ()| 1u64);
        let ctx = context(LibraryEnvironment::new().with_library(Arc::clone(&module)));

        assert_eq!(ctx.patch(&HalfPatchedPlugin), Guarded::Ran(PluginState::Failed));
        assert_eq!(ctx.patch(&HalfPatchedPlugin), Guarded::AlreadyApplied(PluginState::Failed));
        assert_eq!(ctx.patch(&HalfPatchedPlugin), Guarded::AlreadyApplied(PluginState::Failed));

        assert_eq!(module.call::<(), u64>("now", ()).unwrap(), 42);
        assert_eq!(module.call::<(), u64>("tick", ()).unwrap(), 1);
        assert!(ctx.installed_targets().is_empty());
        assert_eq!(ctx.registry().state("half.monkey_patch"), PluginState::Failed);
    }

    #[test]
    fn test_patch_id() {
        let info = PluginInfo::new("psycopg2", "psycopg2", "0.0.1");
        assert_eq!(info.patch_id(), "psycopg2.monkey_patch");
    }
}
