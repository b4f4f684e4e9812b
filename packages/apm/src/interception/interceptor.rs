// packages/apm/src/interception/interceptor.rs
//! Interceptor: binds one patch target to one wrapper factory
//!
//! `enable()` reads the callable behind the target, hands it to the factory
//! and installs the result in its place. Every caller of the hook observes the
//! wrapped behavior from then on. Enabling twice wraps twice; the idempotency
//! guard in [`crate::interception::once`] is what keeps plugins from doing that.

use crate::interception::hook::{Callable, HookPoint, LibraryModule};
use crate::utils::errors::{ApmError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Produces a replacement callable from the original
pub trait WrapperFactory<A, R>: Send + Sync {
    fn wrap(&self, original: Callable<A, R>) -> Callable<A, R>;
}

/// Wrapper factory backed by a closure
pub struct FnWrapper<F>(F);

/// Use a closure as a [`WrapperFactory`]
pub fn wrapper_fn<A, R, F>(f: F) -> FnWrapper<F>
where
    F: Fn(Callable<A, R>) -> Callable<A, R> + Send + Sync,
{
    FnWrapper(f)
}

impl<A, R, F> WrapperFactory<A, R> for FnWrapper<F>
where
    F: Fn(Callable<A, R>) -> Callable<A, R> + Send + Sync,
{
    fn wrap(&self, original: Callable<A, R>) -> Callable<A, R> {
        (self.0)(original)
    }
}

/// Host module plus attribute name, resolved to a typed hook point
pub struct PatchTarget<A, R> {
    module: Arc<LibraryModule>,
    attribute: String,
    hook: Arc<HookPoint<A, R>>,
}

impl<A: 'static, R: 'static> PatchTarget<A, R> {
    /// Resolve `attribute` on `module`; the attribute must exist with this signature
    pub fn resolve(module: &Arc<LibraryModule>, attribute: &str) -> Result<Self> {
        let hook = module.hook::<A, R>(attribute)?;
        Ok(Self {
            module: Arc::clone(module),
            attribute: attribute.to_string(),
            hook,
        })
    }

    pub fn module(&self) -> &Arc<LibraryModule> {
        &self.module
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// `module.attribute`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module.name(), self.attribute)
    }
}

/// Binds a [`PatchTarget`] to a [`WrapperFactory`]
pub struct Interceptor<A, R> {
    target: PatchTarget<A, R>,
    factory: Arc<dyn WrapperFactory<A, R>>,
    original: Mutex<Option<Callable<A, R>>>,
}

impl<A: 'static, R: 'static> Interceptor<A, R> {
    /// Create an interceptor; nothing is patched until [`Interceptor::enable`]
    pub fn new<W>(module: &Arc<LibraryModule>, attribute: &str, factory: W) -> Result<Self>
    where
        W: WrapperFactory<A, R> + 'static,
    {
        Ok(Self {
            target: PatchTarget::resolve(module, attribute)?,
            factory: Arc::new(factory),
            original: Mutex::new(None),
        })
    }

    /// The patch target this interceptor wraps
    pub fn target(&self) -> &PatchTarget<A, R> {
        &self.target
    }

    /// Wrap the current callable and install the wrapper
    pub fn enable(&self) {
        let mut original = self.original.lock();
        let replaced = self
            .target
            .hook
            .swap_with(|current| self.factory.wrap(current));

        // Keep the first original so disable() unwinds every layer we added
        if original.is_none() {
            *original = Some(replaced);
        }

        debug!("Enabled interceptor on {}", self.target.qualified_name());
    }

    /// Restore the callable captured by the first `enable()`
    pub fn disable(&self) -> Result<()> {
        // Held across the restore so a concurrent enable() cannot capture a wrapper as its original
        let mut guard = self.original.lock();
        let original = guard
            .take()
            .ok_or_else(|| ApmError::NotEnabled(self.target.qualified_name()))?;

        self.target.hook.replace(original);
        drop(guard);
        debug!("Disabled interceptor on {}", self.target.qualified_name());
        Ok(())
    }

    /// Check if the wrapper is currently installed
    pub fn is_enabled(&self) -> bool {
        self.original.lock().is_some()
    }
}

/// Type-erased view of an interceptor, so one plugin can hold several
/// targets with different signatures
pub trait Interception: Send + Sync {
    fn target_name(&self) -> String;
    fn enable(&self);
    fn disable(&self) -> Result<()>;
    fn is_enabled(&self) -> bool;
}

impl<A: 'static, R: 'static> Interception for Interceptor<A, R> {
    fn target_name(&self) -> String {
        self.target.qualified_name()
    }

    fn enable(&self) {
        Interceptor::enable(self)
    }

    fn disable(&self) -> Result<()> {
        Interceptor::disable(self)
    }

    fn is_enabled(&self) -> bool {
        Interceptor::is_enabled(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_wrapper(counter: Arc<AtomicUsize>) -> impl WrapperFactory<i32, i32> {
        wrapper_fn(move |original: Callable<i32, i32>| {
            let counter = Arc::clone(&counter);
            Arc::new(move |x: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                original(x)
            }) as Callable<i32, i32>
        })
    }

    fn math_module() -> Arc<LibraryModule> {
        let module = Arc::new(LibraryModule::new("math", "1.0.0"));
        module.expose("negate", |x: i32| -x);
        module
    }

    #[test]
    fn test_new_does_not_patch() {
        let module = math_module();
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptor = Interceptor::new(&module, "negate", counting_wrapper(Arc::clone(&calls))).unwrap();

        assert!(!interceptor.is_enabled());
        assert_eq!(module.call::<i32, i32>("negate", 3).unwrap(), -3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_enable_routes_through_wrapper() {
        let module = math_module();
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptor = Interceptor::new(&module, "negate", counting_wrapper(Arc::clone(&calls))).unwrap();

        interceptor.enable();

        assert_eq!(module.call::<i32, i32>("negate", 7).unwrap(), -7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(interceptor.target().qualified_name(), "math.negate");
    }

    #[test]
    fn test_enable_twice_double_wraps() {
        let module = math_module();
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptor = Interceptor::new(&module, "negate", counting_wrapper(Arc::clone(&calls))).unwrap();

        interceptor.enable();
        interceptor.enable();
        module.call::<i32, i32>("negate", 1).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disable_restores_original() {
        let module = math_module();
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptor = Interceptor::new(&module, "negate", counting_wrapper(Arc::clone(&calls))).unwrap();

        interceptor.enable();
        interceptor.enable();
        interceptor.disable().unwrap();

        assert_eq!(module.call::<i32, i32>("negate", 2).unwrap(), -2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!interceptor.is_enabled());
    }

    #[test]
    fn test_disable_without_enable() {
        let module = math_module();
        let interceptor = Interceptor::new(&module, "negate", counting_wrapper(Arc::new(AtomicUsize::new(0)))).unwrap();

        let err = interceptor.disable().unwrap_err();
        assert_eq!(err, ApmError::NotEnabled("math.negate".to_string()));
    }

    #[test]
    fn test_missing_target() {
        let module = math_module();
        let result = Interceptor::new(&module, "absent", counting_wrapper(Arc::new(AtomicUsize::new(0))));
        assert!(matches!(result, Err(ApmError::PatchTargetMissing { .. })));
    }

    #[test]
    fn test_wrapper_sees_unmodified_arguments() {
        let module = math_module();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_wrapper = Arc::clone(&seen);

        let interceptor = Interceptor::new(
            &module,
            "negate",
            wrapper_fn(move |original: Callable<i32, i32>| {
                let seen = Arc::clone(&seen_in_wrapper);
                Arc::new(move |x: i32| {
                    seen.lock().push(x);
                    original(x)
                }) as Callable<i32, i32>
            }),
        )
        .unwrap();
        interceptor.enable();

        let results: Vec<i32> = (1..=3)
            .map(|x| module.call::<i32, i32>("negate", x).unwrap())
            .collect();

        assert_eq!(results, vec![-1, -2, -3]);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_concurrent_enable_disable_stays_consistent() {
        let module = math_module();
        let calls = Arc::new(AtomicUsize::new(0));
        let interceptor = Arc::new(
            Interceptor::new(&module, "negate", counting_wrapper(Arc::clone(&calls))).unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let interceptor = Arc::clone(&interceptor);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if i % 2 == 0 {
                            interceptor.enable();
                        } else {
                            let _ = interceptor.disable();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Whatever interleaving happened, one disable() must leave the hook unwrapped
        let _ = interceptor.disable();
        calls.store(0, Ordering::SeqCst);
        assert_eq!(module.call::<i32, i32>("negate", 5).unwrap(), -5);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!interceptor.is_enabled());
    }

    #[test]
    fn test_type_erased_interception() {
        let module = math_module();
        let interceptor: Box<dyn Interception> = Box::new(
            Interceptor::new(&module, "negate", counting_wrapper(Arc::new(AtomicUsize::new(0)))).unwrap(),
        );

        interceptor.enable();
        assert!(interceptor.is_enabled());
        assert_eq!(interceptor.target_name(), "math.negate");
        interceptor.disable().unwrap();
    }
}
