// packages/apm/src/plugins/aioredis.rs
//! aioredis plugin
//!
//! Wraps the async `aioredis.execute` entry point. The span opens when the
//! command is issued and closes when its future resolves.

use crate::agent::plugin::{PatchContext, PluginInfo, PluginModule};
use crate::interception::hook::LibraryModule;
use crate::interception::interceptor::{Interception, Interceptor};
use crate::interception::wrapper::{AsyncPluginWrapper, TracePlugin};
use crate::recording::span::SpanRecord;
use crate::utils::errors::Result;
use futures::future::BoxFuture;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

pub const LIBRARY: &str = "aioredis";
pub const VERSION: &str = "0.0.1";
pub const AUTHOR: &str = "liu.mingyi@navercorp.com";

/// One Redis command as issued through `execute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl RedisCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Trace plugin for `aioredis.execute`; values are not recorded
#[derive(Debug, Clone, Default)]
pub struct RedisCommandPlugin;

impl<V, E: Display> TracePlugin<RedisCommand, std::result::Result<V, E>> for RedisCommandPlugin {
    fn on_before(&self, span: &mut SpanRecord, command: &RedisCommand) {
        span.set_attribute("db.system", "redis");
        span.set_attribute("db.operation", command.name.to_uppercase());
        if let Some(key) = command.args.first() {
            span.set_attribute("db.redis.key", key.clone());
        }
    }

    fn on_end(&self, span: &mut SpanRecord, ret: &std::result::Result<V, E>) {
        if let Err(e) = ret {
            span.set_error(e.to_string());
        }
    }
}

/// Plugin module for `aioredis`, generic over the reply and error types
pub struct AioRedisPlugin<V, E> {
    _types: PhantomData<fn() -> (V, E)>,
}

impl<V, E> AioRedisPlugin<V, E> {
    pub fn new() -> Self {
        Self { _types: PhantomData }
    }
}

impl<V, E> Default for AioRedisPlugin<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> PluginModule for AioRedisPlugin<V, E>
where
    V: Send + 'static,
    E: Display + Send + 'static,
{
    fn info(&self) -> PluginInfo {
        PluginInfo::new(LIBRARY, LIBRARY, VERSION).with_author(AUTHOR)
    }

    fn interceptors(&self, module: &Arc<LibraryModule>, ctx: &PatchContext) -> Result<Vec<Box<dyn Interception>>> {
        let execute = Interceptor::<RedisCommand, BoxFuture<'static, std::result::Result<V, E>>>::new(
            module,
            "execute",
            AsyncPluginWrapper::new(LIBRARY, "execute", RedisCommandPlugin, ctx.sink()),
        )?;

        Ok(vec![Box::new(execute) as Box<dyn Interception>])
    }
}
