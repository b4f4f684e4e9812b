// packages/apm/src/integrations/fastapi.rs
//! FastAPI-style async integration
//!
//! [`PinpointLayer`] is a `tower` layer that records one span per request
//! around any `Service<Request<B>, Response = Response<C>>`.
//! [`async_monkey_patch_for_pinpoint`] activates the async library plugins.

use crate::agent::dispatch::{DispatchReport, Dispatcher};
use crate::integrations::request::RequestPlugin;
use crate::recording::sink::{PendingSpan, SpanSink};
use crate::recording::span::SpanRecord;
use crate::utils::config::PatchFlags;
use futures::future::BoxFuture;
use hyper::{Request, Response};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::info;

pub const NAME: &str = "fastapi";

/// Dispatch namespace for async library plugins
pub const ASYNC_NAMESPACE: &str = "fastapi";

/// Async library plugins to activate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncPatchFlags {
    pub aioredis: bool,
}

impl Default for AsyncPatchFlags {
    fn default() -> Self {
        Self { aioredis: true }
    }
}

impl From<AsyncPatchFlags> for PatchFlags {
    fn from(flags: AsyncPatchFlags) -> Self {
        PatchFlags::new().with("aioredis", flags.aioredis)
    }
}

/// Activate the async library plugins selected by `flags`
pub fn async_monkey_patch_for_pinpoint(dispatcher: &Dispatcher, flags: AsyncPatchFlags) -> DispatchReport {
    let flags = PatchFlags::from(flags);
    for name in flags.enabled() {
        info!("Trying to install {}.{} plugin", ASYNC_NAMESPACE, name);
    }
    dispatcher.dispatch(ASYNC_NAMESPACE, &flags)
}

/// Layer producing [`PinpointMiddleware`]
#[derive(Clone)]
pub struct PinpointLayer {
    sink: Arc<dyn SpanSink>,
}

impl PinpointLayer {
    /// Create a layer recording into `sink`
    pub fn new(sink: Arc<dyn SpanSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for PinpointLayer {
    type Service = PinpointMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PinpointMiddleware {
            inner,
            sink: Arc::clone(&self.sink),
        }
    }
}

/// Request-span middleware; the span closes when the response future resolves or is dropped
#[derive(Clone)]
pub struct PinpointMiddleware<S> {
    inner: S,
    sink: Arc<dyn SpanSink>,
}

impl<S, B, C> Service<Request<B>> for PinpointMiddleware<S>
where
    S: Service<Request<B>, Response = Response<C>>,
    S::Future: Send + 'static,
    S::Error: Display + Send + 'static,
    C: Send + 'static,
{
    type Response = Response<C>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let mut span = SpanRecord::start(NAME, "request");
        RequestPlugin::record_request(&mut span, req.method(), req.uri());

        let mut pending = PendingSpan::new(span, Instant::now(), Arc::clone(&self.sink));
        let response = self.inner.call(req);

        Box::pin(async move {
            let result = response.await;
            match &result {
                Ok(resp) => pending.annotate(|span| RequestPlugin::record_status(span, resp.status())),
                Err(e) => pending.annotate(|span| span.set_error(e.to_string())),
            }
            pending.close();
            result
        })
    }
}
