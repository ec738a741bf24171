//! Caching layer for the engine.
//!
//! Provides in-memory and Redis backends with a consistent interface.
//! Entries expire by TTL only; nothing in the engine purges them on writes.

pub mod helpers;
pub mod memory;
pub mod noop;
#[cfg(feature = "redis")]
pub mod redis;
pub mod r#trait;

pub use helpers::*;
pub use memory::MemoryCache;
pub use noop::NoopCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;
pub use r#trait::{Cache, CacheError, CacheResult, CacheStats};
