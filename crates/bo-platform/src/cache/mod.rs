//! Cache Store and key helpers

pub mod keys;
pub mod store;

pub use keys::{cache_key, cache_key_with_params, prefix_of};
pub use store::{CacheEntryOptions, CachePriority, CacheStats, CacheStore};
