// packages/apm/src/integrations/django.rs
//! Django integration
//!
//! [`DjangoMiddleware`] wraps the application's request handler with a
//! request span. [`DjangoAppConfig::ready`] is the app-startup hook: it
//! activates the configured `libs` plugins.

use crate::agent::dispatch::{DispatchReport, Dispatcher};
use crate::integrations::request::RequestPlugin;
use crate::interception::hook::Callable;
use crate::interception::interceptor::WrapperFactory;
use crate::interception::wrapper::PluginWrapper;
use crate::recording::sink::SpanSink;
use crate::utils::config::PatchFlags;
use hyper::{Request, Response};
use std::sync::Arc;
use tracing::info;

pub const NAME: &str = "django";
pub const VERSION: &str = "0.0.3";

/// Dispatch namespace for synchronous library plugins
pub const LIBS_NAMESPACE: &str = "libs";

/// Request-span middleware for a synchronous handler
pub struct DjangoMiddleware {
    wrapper: PluginWrapper<RequestPlugin>,
}

impl DjangoMiddleware {
    /// Create a middleware recording into `sink`
    pub fn new(sink: Arc<dyn SpanSink>) -> Self {
        Self {
            wrapper: PluginWrapper::new(NAME, "request", RequestPlugin, sink),
        }
    }

    /// Wrap `handler`; the returned handler behaves identically and records one span per request
    pub fn wrap<B, C>(&self, handler: Callable<Request<B>, Response<C>>) -> Callable<Request<B>, Response<C>>
    where
        B: 'static,
        C: 'static,
    {
        self.wrapper.wrap(handler)
    }

    /// [`DjangoMiddleware::wrap`] for a plain closure
    pub fn wrap_fn<B, C, F>(&self, handler: F) -> Callable<Request<B>, Response<C>>
    where
        B: 'static,
        C: 'static,
        F: Fn(Request<B>) -> Response<C> + Send + Sync + 'static,
    {
        let handler: Callable<Request<B>, Response<C>> = Arc::new(handler);
        self.wrap(handler)
    }
}

/// App-startup hook of the integration
pub struct DjangoAppConfig {
    dispatcher: Dispatcher,
    libs: PatchFlags,
}

impl DjangoAppConfig {
    pub fn new(dispatcher: Dispatcher, libs: PatchFlags) -> Self {
        Self { dispatcher, libs }
    }

    /// Library flags applied by `ready`
    pub fn flags(&self) -> &PatchFlags {
        &self.libs
    }

    /// Activate the configured library plugins; safe to call more than once
    pub fn ready(&self) -> DispatchReport {
        info!("{} integration v{} ready", NAME, VERSION);
        self.dispatcher.dispatch(LIBS_NAMESPACE, &self.libs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::catalog::PluginCatalog;
    use crate::agent::environment::LibraryEnvironment;
    use crate::agent::plugin::PatchContext;
    use crate::interception::hook::LibraryModule;
    use crate::interception::once::{PatchRegistry, PluginState};
    use crate::plugins::psycopg2::{ConnectArgs, Psycopg2Plugin};
    use crate::recording::span_queue::SpanQueue;
    use hyper::StatusCode;

    fn handler(req: Request<String>) -> Response<String> {
        match req.uri().path() {
            "/health" => Response::new("ok".to_string()),
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(String::new())
                .unwrap(),
        }
    }

    #[test]
    fn test_middleware_records_request_span() {
        let queue = Arc::new(SpanQueue::new(16));
        let wrapped = DjangoMiddleware::new(queue.clone()).wrap_fn(handler);

        let ok = wrapped(Request::get("/health").body(String::new()).unwrap());
        let missing = wrapped(Request::post("/nope").body(String::new()).unwrap());

        assert_eq!(ok.body(), "ok");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let spans = queue.drain();
        assert_eq!(spans[0].name(), "django.request");
        assert_eq!(spans[0].attribute("http.status_code"), Some("200"));
        assert!(!spans[0].is_error());
        assert_eq!(spans[1].attribute("http.method"), Some("POST"));
        assert!(spans[1].is_error());
    }

    #[test]
    fn test_ready_activates_libs() {
        let psycopg2 = Arc::new(LibraryModule::new("psycopg2", "2.9.9"));
        psycopg2.expose("connect", |args: ConnectArgs| -> Result<String, String> { Ok(args.dsn) });

        let queue = Arc::new(SpanQueue::new(16));
        let env = LibraryEnvironment::new().with_library(Arc::clone(&psycopg2));
        let context = PatchContext::new(Arc::new(env), queue.clone()).with_registry(Arc::new(PatchRegistry::new()));
        let catalog = PluginCatalog::new().with(LIBS_NAMESPACE, Psycopg2Plugin::<String, String>::new());
        let app = DjangoAppConfig::new(
            Dispatcher::new(Arc::new(catalog), Arc::new(context)),
            PatchFlags::new().with("psycopg2", true),
        );

        assert_eq!(app.ready().patched(), vec!["psycopg2"]);
        assert!(matches!(
            app.ready().outcome("psycopg2"),
            Some(crate::agent::dispatch::DispatchOutcome::Attempted { state: PluginState::Patched, fresh: false })
        ));

        psycopg2
            .call::<ConnectArgs, Result<String, String>>("connect", ConnectArgs::new("dbname=app"))
            .unwrap()
            .unwrap();
        assert_eq!(queue.len(), 1);
    }
}
