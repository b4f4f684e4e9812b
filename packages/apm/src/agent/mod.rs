// packages/apm/src/agent/mod.rs
//! Agent: plugin modules, the library environment and flag-driven dispatch
//!
//! - **Environment**: which host libraries are installed, and probing for them
//! - **Plugin**: per-library adapters and the context they patch in
//! - **Catalog**: plugins registered under `<namespace>.<name>`
//! - **Dispatch**: turn a set of flags into guarded `monkey_patch` calls
//! - **Runtime**: the configured agent tying the above to one span queue
//!
//! # Architecture
//!
//! ```text
//! shim (django / fastapi)
//!     │  PatchFlags { psycopg2: true, ... }
//!     ▼
//! Dispatcher ──► PluginCatalog.resolve("libs", "psycopg2")
//!     │
//!     ├──► LibraryEnvironment.probe("psycopg2")
//!     ▼
//! PluginModule.monkey_patch() ──► PatchRegistry (once per id)
//! ```

pub mod catalog;
pub mod dispatch;
pub mod environment;
pub mod plugin;
pub mod runtime;

// Re-export commonly used types
pub use catalog::PluginCatalog;
pub use dispatch::{DispatchOutcome, DispatchReport, Dispatcher};
pub use environment::{Availability, LibraryEnvironment, ProbeReport};
pub use plugin::{PatchContext, PluginInfo, PluginModule};
pub use runtime::ApmAgent;
pub use crate::utils::config::PatchFlags;
