// packages/apm/src/integrations/mod.rs
//! Framework integration shims
//!
//! Each shim does two things: trace inbound requests, and decide from its
//! flags which library plugins to activate.
//!
//! - **django**: synchronous handler middleware and the `ready()` startup hook
//!   (namespace `libs`)
//! - **fastapi**: `tower` layer for async services and
//!   `async_monkey_patch_for_pinpoint` (namespace `fastapi`)

pub mod django;
pub mod fastapi;
pub mod request;

// Re-export commonly used types
pub use django::{DjangoAppConfig, DjangoMiddleware};
pub use fastapi::{async_monkey_patch_for_pinpoint, AsyncPatchFlags, PinpointLayer, PinpointMiddleware};
pub use request::RequestPlugin;
