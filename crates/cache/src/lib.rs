//! PhotoWall Cache Library
//!
//! Byte-bounded in-memory cache for decoded images with LRU eviction.

pub mod config;
pub mod memory;
pub mod ram;

pub use config::{CacheConfig, CacheConfigFile, ConfigError};
pub use ram::{ByteSize, CacheStats, MemoryCache, Sizer};
