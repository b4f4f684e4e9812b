// packages/apm/src/agent/catalog.rs
//! Plugin catalog
//!
//! Plugins are registered up front under `<namespace>.<name>` keys, the same
//! names the dispatch flags use. Nothing is discovered at runtime.

use crate::agent::plugin::PluginModule;
use crate::utils::errors::{ApmError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registered plugin modules
#[derive(Default, Clone)]
pub struct PluginCatalog {
    plugins: BTreeMap<String, Arc<dyn PluginModule>>,
}

impl PluginCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{}.{}", namespace, name)
    }

    /// Register `plugin` in `namespace` under its own name
    pub fn register<P: PluginModule + 'static>(&mut self, namespace: &str, plugin: P) -> &mut Self {
        let key = Self::key(namespace, &plugin.info().name);
        debug!("Registering plugin {}", key);
        self.plugins.insert(key, Arc::new(plugin));
        self
    }

    /// Builder-style [`PluginCatalog::register`]
    pub fn with<P: PluginModule + 'static>(mut self, namespace: &str, plugin: P) -> Self {
        self.register(namespace, plugin);
        self
    }

    /// Look up the plugin registered as `<namespace>.<name>`
    pub fn resolve(&self, namespace: &str, name: &str) -> Result<Arc<dyn PluginModule>> {
        let key = Self::key(namespace, name);
        self.plugins
            .get(&key)
            .cloned()
            .ok_or_else(|| ApmError::MalformedPlugin(format!("no plugin module registered as {}", key)))
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check if no plugin is registered
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
