// packages/apm/src/plugins/mod.rs
//! Bundled library plugins
//!
//! - **Common**: generic plugin for fallible calls
//! - **psycopg2**: `connect` spans with database system, host and name
//! - **aioredis**: async `execute` spans with the Redis operation
//!
//! Library plugins are generic over the value and error types their binding
//! returns, so the host picks them when registering:
//!
//! ```ignore
//! let catalog = PluginCatalog::new()
//!     .with("libs", Psycopg2Plugin::<PgConnection, PgError>::new())
//!     .with("fastapi", AioRedisPlugin::<RedisValue, RedisError>::new());
//! ```

pub mod aioredis;
pub mod common;
pub mod psycopg2;

// Re-export commonly used types
pub use aioredis::{AioRedisPlugin, RedisCommand, RedisCommandPlugin};
pub use common::CommonPlugin;
pub use psycopg2::{ConnectArgs, ConnectionPlugin, Psycopg2Plugin};
