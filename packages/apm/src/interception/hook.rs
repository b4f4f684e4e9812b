// packages/apm/src/interception/hook.rs
//! Hook points and library modules
//!
//! A library binding routes each public entry point through a [`HookPoint`],
//! a named function slot that interceptors can swap at runtime. The hook points
//! of one library live in a [`LibraryModule`], the namespace a patch target is
//! resolved against.
//!
//! ```text
//! caller ──► module.call("connect", args) ──► HookPoint ──► current callable
//!                                                              │
//!                                      (wrapper after enable) ─┴─► original
//! ```

use crate::utils::errors::{ApmError, Result};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Shared, thread-safe callable stored in a hook point
pub type Callable<A, R> = Arc<dyn Fn(A) -> R + Send + Sync>;

/// Callable whose result is produced asynchronously
pub type AsyncCallable<A, R> = Callable<A, BoxFuture<'static, R>>;

/// Named, swappable function slot
pub struct HookPoint<A, R> {
    name: String,
    current: RwLock<Callable<A, R>>,
}

impl<A: 'static, R: 'static> HookPoint<A, R> {
    /// Create a hook point backed by `f`
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            current: RwLock::new(Arc::new(f)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the callable currently installed
    pub fn current(&self) -> Callable<A, R> {
        Arc::clone(&self.current.read())
    }

    /// Install `f`, returning the callable it replaced
    pub fn replace(&self, f: Callable<A, R>) -> Callable<A, R> {
        debug!("Replacing callable behind hook {}", self.name);
        std::mem::replace(&mut *self.current.write(), f)
    }

    /// Atomically derive a new callable from the current one.
    ///
    /// The write lock is held while `derive` runs, so concurrent swaps on the
    /// same hook serialize. Returns the callable that was replaced.
    pub fn swap_with<F>(&self, derive: F) -> Callable<A, R>
    where
        F: FnOnce(Callable<A, R>) -> Callable<A, R>,
    {
        let mut current = self.current.write();
        let previous = Arc::clone(&current);
        *current = derive(Arc::clone(&previous));
        previous
    }

    /// Invoke whatever callable is installed.
    ///
    /// The lock is released before the call so wrapped code may re-enter.
    pub fn call(&self, args: A) -> R {
        let f = self.current();
        f(args)
    }
}

impl<A, R> std::fmt::Debug for HookPoint<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPoint").field("name", &self.name).finish()
    }
}

/// Namespace of hook points exposed by one host library
pub struct LibraryModule {
    name: String,
    version: String,
    attributes: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl LibraryModule {
    /// Create an empty module
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            attributes: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installed version string
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Expose `f` under `attribute`, replacing any previous attribute of that name
    pub fn expose<A, R, F>(&self, attribute: &str, f: F) -> Arc<HookPoint<A, R>>
    where
        A: 'static,
        R: 'static,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let hook = Arc::new(HookPoint::new(format!("{}.{}", self.name, attribute), f));
        self.attributes
            .insert(attribute.to_string(), Arc::clone(&hook) as Arc<dyn Any + Send + Sync>);
        hook
    }

    /// Expose an async entry point; the returned future is boxed
    pub fn expose_async<A, R, F, Fut>(&self, attribute: &str, f: F) -> Arc<HookPoint<A, BoxFuture<'static, R>>>
    where
        A: 'static,
        R: 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.expose(attribute, move |args: A| f(args).boxed())
    }

    /// Check if the module exposes `attribute`
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Attribute names, sorted
    pub fn attributes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Resolve a typed hook point
    pub fn hook<A: 'static, R: 'static>(&self, attribute: &str) -> Result<Arc<HookPoint<A, R>>> {
        let entry = self
            .attributes
            .get(attribute)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ApmError::target_missing(&self.name, attribute))?;

        entry
            .downcast::<HookPoint<A, R>>()
            .map_err(|_| ApmError::signature_mismatch(&self.name, attribute))
    }

    /// Call an attribute through its hook point
    pub fn call<A: 'static, R: 'static>(&self, attribute: &str, args: A) -> Result<R> {
        Ok(self.hook::<A, R>(attribute)?.call(args))
    }
}

impl std::fmt::Debug for LibraryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("attributes", &self.attributes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_call_and_replace() {
        let hook = HookPoint::new("math.double", |x: i32| x * 2);
        assert_eq!(hook.call(4), 8);

        let previous = hook.replace(Arc::new(|x: i32| x * 3));
        assert_eq!(previous(4), 8);
        assert_eq!(hook.call(4), 12);
    }

    #[test]
    fn test_swap_with_sees_current() {
        let hook = HookPoint::new("math.inc", |x: i32| x + 1);
        hook.swap_with(|inner| Arc::new(move |x: i32| inner(x) * 10));
        assert_eq!(hook.call(1), 20);
    }

    #[test]
    fn test_module_lookup() {
        let module = LibraryModule::new("math", "1.0.0");
        module.expose("square", |x: u64| x * x);

        assert!(module.has_attribute("square"));
        assert_eq!(module.call::<u64, u64>("square", 5).unwrap(), 25);
        assert_eq!(module.attributes(), vec!["square".to_string()]);
    }

    #[test]
    fn test_missing_attribute() {
        let module = LibraryModule::new("math", "1.0.0");
        let err = module.hook::<u64, u64>("cube").unwrap_err();
        assert_eq!(err, ApmError::target_missing("math", "cube"));
    }

    #[test]
    fn test_signature_mismatch() {
        let module = LibraryModule::new("math", "1.0.0");
        module.expose("square", |x: u64| x * x);

        let err = module.hook::<String, u64>("square").unwrap_err();
        assert_eq!(err, ApmError::signature_mismatch("math", "square"));
    }

    #[tokio::test]
    async fn test_async_attribute() {
        let module = LibraryModule::new("kv", "2.0.0");
        module.expose_async("get", |key: String| async move { format!("value-of-{}", key) });

        let fut = module
            .call::<String, BoxFuture<'static, String>>("get", "a".to_string())
            .unwrap();
        assert_eq!(fut.await, "value-of-a");
    }
}
