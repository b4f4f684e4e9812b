// packages/apm/src/utils/config.rs
//! Agent configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! (`apm.toml`, `apm.yaml` or `apm.json` in the working directory, or an
//! explicit path), then `APM_*` environment variables. Nested keys use `__`,
//! e.g. `APM_PLUGINS__LIBS__PSYCOPG2=true`.

use crate::utils::errors::{ApmError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One boolean per optional library integration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchFlags(BTreeMap<String, bool>);

impl PatchFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style flag
    pub fn with(mut self, library: impl Into<String>, enabled: bool) -> Self {
        self.set(library, enabled);
        self
    }

    /// Turn one library on or off
    pub fn set(&mut self, library: impl Into<String>, enabled: bool) {
        self.0.insert(library.into(), enabled);
    }

    /// Check if `library` is on; unknown libraries are off
    pub fn is_enabled(&self, library: &str) -> bool {
        self.0.get(library).copied().unwrap_or(false)
    }

    /// Libraries flagged on, in name order
    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, on)| **on).map(|(name, _)| name.as_str())
    }

    /// Iterate flags in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(name, on)| (name.as_str(), *on))
    }

    /// Number of flags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no flag is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for PatchFlags {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, on)| (name.into(), on)).collect())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Plugin flags per dispatch namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Synchronous library plugins (activated by the Django shim)
    pub libs: PatchFlags,

    /// Async library plugins (activated by the FastAPI shim)
    pub fastapi: PatchFlags,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            libs: PatchFlags::new().with("psycopg2", true),
            fastapi: PatchFlags::new().with("aioredis", true),
        }
    }
}

/// Top-level agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Application name attached to the agent
    pub app_name: String,

    pub log: LogConfig,

    /// Capacity of the span queue handed to plugins
    pub span_queue_capacity: usize,

    pub plugins: PluginConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: "apm-app".to_string(),
            log: LogConfig::default(),
            span_queue_capacity: 10_000,
            plugins: PluginConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from `./apm.*` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load with an explicit config file, which must exist
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AgentConfig::default())?);

        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("apm").required(false)),
        };

        let config: AgentConfig = builder
            .add_source(
                Environment::with_prefix("APM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate loaded values
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(ApmError::ConfigError("app_name cannot be empty".to_string()));
        }
        if self.span_queue_capacity == 0 {
            return Err(ApmError::ConfigError(
                "span_queue_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.plugins.libs.is_enabled("psycopg2"));
        assert!(config.plugins.fastapi.is_enabled("aioredis"));
        assert!(!config.log.json);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
app_name = "checkout"
span_queue_capacity = 64

[log]
json = true

[plugins.libs]
psycopg2 = false

[plugins.fastapi]
aioredis = true
"#
        )
        .unwrap();

        let config = AgentConfig::load_from(Some(file.path())).unwrap();

        assert_eq!(config.app_name, "checkout");
        assert_eq!(config.span_queue_capacity, 64);
        assert!(config.log.json);
        assert_eq!(config.log.level, "info");
        assert!(!config.plugins.libs.is_enabled("psycopg2"));
        assert!(config.plugins.fastapi.is_enabled("aioredis"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = AgentConfig::load_from(Some(Path::new("/nonexistent/apm.toml")));
        assert!(matches!(result, Err(ApmError::ConfigError(_))));
    }

    #[test]
    fn test_validation() {
        let config = AgentConfig {
            span_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            app_name: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_patch_flags() {
        let flags: PatchFlags = [("aioredis", true), ("psycopg2", false), ("asyncpg", true)]
            .into_iter()
            .collect();

        assert_eq!(flags.enabled().collect::<Vec<_>>(), vec!["aioredis", "asyncpg"]);
        assert!(!flags.is_enabled("psycopg2"));
        assert!(!flags.is_enabled("unknown"));
        assert_eq!(flags.len(), 3);
    }
}
