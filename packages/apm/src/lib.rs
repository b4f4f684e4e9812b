// packages/apm/src/lib.rs
//! Sentra Lab APM Agent Library
//!
//! Attaches tracing to third-party library calls without touching the
//! libraries themselves. Library bindings route their public entry points
//! through hook points; plugins swap those hook points for wrappers that
//! record a span around each call.
//!
//! # Architecture
//!
//! The agent is structured into several key modules:
//!
//! - **interception**: hook points, interceptors and the patch-once registry
//! - **agent**: plugin modules, library probing and flag-driven dispatch
//! - **plugins**: bundled library plugins (psycopg2, aioredis)
//! - **integrations**: framework shims (Django, FastAPI-style tower layer)
//! - **recording**: span records and sinks
//! - **observability**: logging and metrics for the agent itself
//! - **utils**: configuration and errors

// Public module exports
pub mod agent;
pub mod integrations;
pub mod interception;
pub mod observability;
pub mod plugins;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use agent::{ApmAgent, DispatchReport, Dispatcher, LibraryEnvironment, PatchContext, PluginCatalog, PluginModule};
pub use interception::{intercept_once, HookPoint, Interceptor, LibraryModule, PluginState};
pub use recording::{SpanRecord, SpanSink};
pub use utils::config::{AgentConfig, PatchFlags};
pub use utils::errors::{ApmError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
