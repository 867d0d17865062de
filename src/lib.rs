//! doc-cache-tier: client-side caching tier for a remote document store.
//!
//! Sits between application code and a latency-costly, pagination-limited
//! store. Repeated reads are served from per-namespace LRU caches with TTL
//! expiry, concurrent remote round trips are bounded by an admission gate,
//! and mutations invalidate every cached entry that references them.
//!
//! The entry point is [`access::PagedAccessLayer`].

pub mod access;
pub mod cache;
pub mod config;
pub mod server;
pub mod store;
