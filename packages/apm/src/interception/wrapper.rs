// packages/apm/src/interception/wrapper.rs
//! Tracing wrappers built from trace plugins
//!
//! A [`TracePlugin`] knows what to record about one library call. The wrappers
//! here turn a plugin into a [`WrapperFactory`]: open a span, let the plugin look
//! at the arguments, delegate to the original, let the plugin look at the
//! result, hand the span to the sink.
//!
//! The original is invoked exactly once per call with the arguments untouched.
//! A panic in the original is recorded and resumed; a panic inside a plugin
//! callback is logged and swallowed so it never changes the library's behavior.

use crate::interception::hook::{AsyncCallable, Callable};
use crate::interception::interceptor::WrapperFactory;
use crate::recording::sink::{PendingSpan, SpanSink};
use crate::recording::span::SpanRecord;
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Per-library tracing logic
pub trait TracePlugin<A, R>: Send + Sync {
    /// Called before the original, with the arguments it is about to receive
    fn on_before(&self, _span: &mut SpanRecord, _args: &A) {}

    /// Called with the original's return value
    fn on_end(&self, _span: &mut SpanRecord, _ret: &R) {}

    /// Called when the original panics
    fn on_exception(&self, span: &mut SpanRecord, message: &str) {
        span.set_error(message);
    }
}

/// Render a panic payload for the span
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

struct SpanScope {
    library: String,
    api: String,
    sink: Arc<dyn SpanSink>,
}

impl SpanScope {
    fn open(&self) -> (SpanRecord, Instant) {
        (SpanRecord::start(&self.library, &self.api), Instant::now())
    }

    fn close(&self, mut span: SpanRecord, started: Instant) {
        span.finish(started.elapsed());
        self.sink.record(span);
    }

    /// Run a plugin callback, containing any panic it raises
    fn contain<F: FnOnce()>(&self, stage: &str, f: F) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            warn!(
                "Trace plugin panicked in {} for {}.{}: {}",
                stage,
                self.library,
                self.api,
                panic_message(payload.as_ref())
            );
        }
    }
}

/// Wrapper factory for synchronous entry points
pub struct PluginWrapper<P> {
    plugin: Arc<P>,
    scope: Arc<SpanScope>,
}

impl<P> PluginWrapper<P> {
    pub fn new(library: impl Into<String>, api: impl Into<String>, plugin: P, sink: Arc<dyn SpanSink>) -> Self {
        Self {
            plugin: Arc::new(plugin),
            scope: Arc::new(SpanScope {
                library: library.into(),
                api: api.into(),
                sink,
            }),
        }
    }
}

impl<A, R, P> WrapperFactory<A, R> for PluginWrapper<P>
where
    A: 'static,
    R: 'static,
    P: TracePlugin<A, R> + 'static,
{
    fn wrap(&self, original: Callable<A, R>) -> Callable<A, R> {
        let plugin = Arc::clone(&self.plugin);
        let scope = Arc::clone(&self.scope);

        Arc::new(move |args: A| {
            let (mut span, started) = scope.open();
            scope.contain("on_before", || plugin.on_before(&mut span, &args));

            match panic::catch_unwind(AssertUnwindSafe(|| original(args))) {
                Ok(ret) => {
                    scope.contain("on_end", || plugin.on_end(&mut span, &ret));
                    scope.close(span, started);
                    ret
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    scope.contain("on_exception", || plugin.on_exception(&mut span, &message));
                    scope.close(span, started);
                    panic::resume_unwind(payload)
                }
            }
        })
    }
}

/// Wrapper factory for async entry points; the span closes when the future resolves or is dropped
pub struct AsyncPluginWrapper<P> {
    plugin: Arc<P>,
    scope: Arc<SpanScope>,
}

impl<P> AsyncPluginWrapper<P> {
    pub fn new(library: impl Into<String>, api: impl Into<String>, plugin: P, sink: Arc<dyn SpanSink>) -> Self {
        Self {
            plugin: Arc::new(plugin),
            scope: Arc::new(SpanScope {
                library: library.into(),
                api: api.into(),
                sink,
            }),
        }
    }
}

impl<A, R, P> WrapperFactory<A, BoxFuture<'static, R>> for AsyncPluginWrapper<P>
where
    A: 'static,
    R: Send + 'static,
    P: TracePlugin<A, R> + 'static,
{
    fn wrap(&self, original: AsyncCallable<A, R>) -> AsyncCallable<A, R> {
        let plugin = Arc::clone(&self.plugin);
        let scope = Arc::clone(&self.scope);

        Arc::new(move |args: A| {
            let (mut span, started) = scope.open();
            scope.contain("on_before", || plugin.on_before(&mut span, &args));

            let plugin = Arc::clone(&plugin);
            let scope = Arc::clone(&scope);

            // Creating the future may itself panic
            let future = match panic::catch_unwind(AssertUnwindSafe(|| original(args))) {
                Ok(future) => future,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    scope.contain("on_exception", || plugin.on_exception(&mut span, &message));
                    scope.close(span, started);
                    panic::resume_unwind(payload)
                }
            };

            // Recorded on drop if the caller abandons the future
            let mut pending = PendingSpan::new(span, started, Arc::clone(&scope.sink));

            async move {
                match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(ret) => {
                        scope.contain("on_end", || pending.annotate(|span| plugin.on_end(span, &ret)));
                        pending.close();
                        ret
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        scope.contain("on_exception", || {
                            pending.annotate(|span| plugin.on_exception(span, &message))
                        });
                        pending.close();
                        panic::resume_unwind(payload)
                    }
                }
            }
            .boxed()
        })
    }
}
