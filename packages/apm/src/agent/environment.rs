// packages/apm/src/agent/environment.rs
//! Installed host libraries and the capability probe
//!
//! Libraries present in the process register their [`LibraryModule`] here at
//! startup. Plugins never assume a library exists; dispatch probes first and
//! hands the typed [`Availability`] to the plugin.

use crate::interception::hook::LibraryModule;
use crate::interception::interceptor::{Interceptor, WrapperFactory};
use crate::utils::errors::{ApmError, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of probing for one optional library
#[derive(Debug, Clone)]
pub enum Availability {
    Available(Arc<LibraryModule>),
    Missing,
}

impl Availability {
    /// Check if the library was found
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }

    /// The module, or `MissingDependency` naming `library`
    pub fn require(&self, library: &str) -> Result<&Arc<LibraryModule>> {
        self.module()
            .ok_or_else(|| ApmError::MissingDependency(library.to_string()))
    }

    /// The installed module, if any
    pub fn module(&self) -> Option<&Arc<LibraryModule>> {
        match self {
            Availability::Available(module) => Some(module),
            Availability::Missing => None,
        }
    }
}

/// Probe results keyed by library name; `None` means missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub versions: BTreeMap<String, Option<String>>,
}

impl ProbeReport {
    /// Check if `library` was found by the probe
    pub fn is_available(&self, library: &str) -> bool {
        matches!(self.versions.get(library), Some(Some(_)))
    }

    /// Probed libraries that are not installed
    pub fn missing(&self) -> Vec<&str> {
        self.versions
            .iter()
            .filter(|(_, version)| version.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Host libraries installed in this process
#[derive(Default)]
pub struct LibraryEnvironment {
    libraries: DashMap<String, Arc<LibraryModule>>,
}

impl LibraryEnvironment {
    /// Create an environment with no libraries installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an installed library under its module name
    pub fn install(&self, module: Arc<LibraryModule>) {
        info!("Registered library {} {}", module.name(), module.version());
        self.libraries.insert(module.name().to_string(), module);
    }

    /// Builder-style [`LibraryEnvironment::install`]
    pub fn with_library(self, module: Arc<LibraryModule>) -> Self {
        self.install(module);
        self
    }

    /// Look up one library without failing
    pub fn probe(&self, library: &str) -> Availability {
        match self.libraries.get(library) {
            Some(entry) => Availability::Available(Arc::clone(entry.value())),
            None => {
                debug!("Library {} is not installed", library);
                Availability::Missing
            }
        }
    }

    /// Build an interceptor on `library.attribute`; an uninstalled library is a configuration error
    pub fn interceptor<A, R, W>(&self, library: &str, attribute: &str, factory: W) -> Result<Interceptor<A, R>>
    where
        A: 'static,
        R: 'static,
        W: WrapperFactory<A, R> + 'static,
    {
        let module = self
            .probe(library)
            .module()
            .cloned()
            .ok_or_else(|| ApmError::ConfigError(format!("host module {} is not installed", library)))?;

        Interceptor::new(&module, attribute, factory)
    }

    /// Probe several libraries at once
    pub fn probe_all<'a>(&self, libraries: impl IntoIterator<Item = &'a str>) -> ProbeReport {
        let versions = libraries
            .into_iter()
            .map(|name| {
                let version = self.probe(name).module().map(|m| m.version().to_string());
                (name.to_string(), version)
            })
            .collect();

        ProbeReport { versions }
    }

    /// Names of every installed library, sorted
    pub fn installed(&self) -> Vec<String> {
        let mut names: Vec<String> = self.libraries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::hook::Callable;
    use crate::interception::interceptor::wrapper_fn;

    #[test]
    fn test_probe() {
        let env = LibraryEnvironment::new().with_library(Arc::new(LibraryModule::new("psycopg2", "2.9.9")));

        assert!(env.probe("psycopg2").is_available());
        assert!(!env.probe("aioredis").is_available());
        assert_eq!(env.probe("psycopg2").module().unwrap().version(), "2.9.9");
        assert_eq!(
            env.probe("aioredis").require("aioredis").err(),
            Some(ApmError::MissingDependency("aioredis".to_string()))
        );
    }

    #[test]
    fn test_probe_all() {
        let env = LibraryEnvironment::new().with_library(Arc::new(LibraryModule::new("psycopg2", "2.9.9")));

        let report = env.probe_all(["psycopg2", "aioredis"]);

        assert!(report.is_available("psycopg2"));
        assert!(!report.is_available("aioredis"));
        assert_eq!(report.missing(), vec!["aioredis"]);
        assert_eq!(report.versions["psycopg2"].as_deref(), Some("2.9.9"));
    }

    #[test]
    fn test_interceptor_requires_installed_library() {
        let env = LibraryEnvironment::new();
        let module = Arc::new(LibraryModule::new("psycopg2", "2.9.9"));
        module.expose("connect", |dsn: String| dsn.len());

        let identity = || wrapper_fn(|original: Callable<String, usize>| original);

        let err = env.interceptor::<String, usize, _>("psycopg2", "connect", identity()).err().unwrap();
        assert!(matches!(err, ApmError::ConfigError(_)));

        env.install(module);
        let interceptor = env.interceptor::<String, usize, _>("psycopg2", "connect", identity()).unwrap();
        assert_eq!(interceptor.target().qualified_name(), "psycopg2.connect");
    }

    #[test]
    fn test_installed_sorted() {
        let env = LibraryEnvironment::new();
        env.install(Arc::new(LibraryModule::new("psycopg2", "2.9.9")));
        env.install(Arc::new(LibraryModule::new("aioredis", "2.0.1")));

        assert_eq!(env.installed(), vec!["aioredis".to_string(), "psycopg2".to_string()]);
    }
}
