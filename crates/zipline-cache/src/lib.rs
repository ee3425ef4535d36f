//! Cache-tier implementations for Zipline.
//!
//! [`RedisCache`] is the production backend; [`MemoryCache`] provides
//! the same semantics in-process for tests and single-node deployments.
//! Both enforce the TTL clipping and negative-entry rules of
//! [`zipline_core::cache`].

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;
