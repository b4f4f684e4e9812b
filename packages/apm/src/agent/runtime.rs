// packages/apm/src/agent/runtime.rs
//! Agent runtime
//!
//! Owns what the plugins share for the life of the process:
//! - The configuration it was started with
//! - The span queue every wrapper records into
//! - The dispatcher the integration shims activate plugins through

use crate::agent::catalog::PluginCatalog;
use crate::agent::dispatch::{DispatchReport, Dispatcher};
use crate::agent::environment::LibraryEnvironment;
use crate::agent::plugin::PatchContext;
use crate::integrations::django::{DjangoAppConfig, DjangoMiddleware, LIBS_NAMESPACE};
use crate::integrations::fastapi::{PinpointLayer, ASYNC_NAMESPACE};
use crate::interception::once::PatchRegistry;
use crate::recording::span_queue::SpanQueue;
use crate::utils::config::AgentConfig;
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::info;

/// A configured agent instance
pub struct ApmAgent {
    config: AgentConfig,
    spans: Arc<SpanQueue>,
    dispatcher: Dispatcher,
}

impl ApmAgent {
    /// Agent sharing the process-wide patch registry
    pub fn new(config: AgentConfig, environment: Arc<LibraryEnvironment>, catalog: PluginCatalog) -> Result<Self> {
        Self::build(config, environment, catalog, PatchRegistry::global())
    }

    /// Agent with its own patch registry
    pub fn isolated(config: AgentConfig, environment: Arc<LibraryEnvironment>, catalog: PluginCatalog) -> Result<Self> {
        Self::build(config, environment, catalog, Arc::new(PatchRegistry::new()))
    }

    fn build(
        config: AgentConfig,
        environment: Arc<LibraryEnvironment>,
        catalog: PluginCatalog,
        registry: Arc<PatchRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let spans = Arc::new(SpanQueue::new(config.span_queue_capacity));
        let context = PatchContext::new(environment, spans.clone()).with_registry(registry);
        let dispatcher = Dispatcher::new(Arc::new(catalog), Arc::new(context));

        info!(
            "APM agent {} started ({} plugins registered, span queue capacity {})",
            config.app_name,
            dispatcher.catalog().len(),
            config.span_queue_capacity
        );

        Ok(Self {
            config,
            spans,
            dispatcher,
        })
    }

    /// Loaded agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Queue the host agent drains
    pub fn spans(&self) -> &Arc<SpanQueue> {
        &self.spans
    }

    /// Dispatcher shared by every integration
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn environment(&self) -> &Arc<LibraryEnvironment> {
        self.dispatcher.context().environment()
    }

    /// Django startup hook bound to the configured `libs` flags
    pub fn django(&self) -> DjangoAppConfig {
        DjangoAppConfig::new(self.dispatcher.clone(), self.config.plugins.libs.clone())
    }

    /// Request middleware for a synchronous handler
    pub fn django_middleware(&self) -> DjangoMiddleware {
        DjangoMiddleware::new(self.spans.clone())
    }

    /// Request layer for a `tower` service stack
    pub fn pinpoint_layer(&self) -> PinpointLayer {
        PinpointLayer::new(self.spans.clone())
    }

    /// Activate every configured plugin in both namespaces
    pub fn patch_all(&self) -> Vec<DispatchReport> {
        vec![
            self.dispatcher.dispatch(LIBS_NAMESPACE, &self.config.plugins.libs),
            self.dispatcher.dispatch(ASYNC_NAMESPACE, &self.config.plugins.fastapi),
        ]
    }
}
