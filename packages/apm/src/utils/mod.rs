// packages/apm/src/utils/mod.rs
//! Shared configuration and error types

pub mod config;
pub mod errors;

pub use config::{AgentConfig, LogConfig, PatchFlags, PluginConfig};
pub use errors::{ApmError, Result};
