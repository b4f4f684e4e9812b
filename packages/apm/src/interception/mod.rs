// packages/apm/src/interception/mod.rs
//! Interception layer
//!
//! Library bindings route their entry points through hook points; plugins
//! swap those hook points for tracing wrappers.
//!
//! - **Hook**: named function slots and the library namespaces that hold them
//! - **Interceptor**: one patch target bound to one wrapper factory
//! - **Once**: process-wide idempotency guard for patch routines
//! - **Wrapper**: sync/async wrapper factories driven by trace plugins
//!
//! # Architecture
//!
//! ```text
//! Plugin.monkey_patch()
//!     │  intercept_once(id)
//!     ▼
//! Interceptor(module, "connect", PluginWrapper)
//!     │  enable()
//!     ▼
//! HookPoint "psycopg2.connect": original ──► wrapper(original)
//! ```

pub mod hook;
pub mod interceptor;
pub mod once;
pub mod wrapper;

// Re-export commonly used types
pub use hook::{AsyncCallable, Callable, HookPoint, LibraryModule};
pub use interceptor::{wrapper_fn, FnWrapper, Interception, Interceptor, PatchTarget, WrapperFactory};
pub use once::{intercept_once, Guarded, PatchRegistry, PluginState};
pub use wrapper::{AsyncPluginWrapper, PluginWrapper, TracePlugin};
