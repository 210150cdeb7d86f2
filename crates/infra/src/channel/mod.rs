//! Restock channel backends beyond the in-memory queue.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisChannelError, RedisStreamsChannel};
