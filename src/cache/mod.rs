//! In-process caching.
//!
//! This module contains the cache data structures and reclamation policy:
//! - [`eviction`]: EvictionCache, a capacity-bounded LRU with hit/miss counters
//! - [`key`]: Namespace and structured CacheKey definitions
//! - [`registry`]: CacheRegistry, which multiplexes the namespace caches and
//!   handles TTL expiry, entity invalidation and memory reclamation

pub mod eviction;
pub mod key;
pub mod registry;

pub use eviction::EvictionCache;
pub use key::{CacheKey, Namespace};
pub use registry::{CacheRegistry, FetchStamp, NamespaceStats, ReclaimReport};
