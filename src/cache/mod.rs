// src/cache/mod.rs
//! Tiered caching for expensive fetches
//!
//! A fast bounded in-memory tier backed by an optional file tier. Entries
//! carry an implicit TTL from configuration; expired entries are never
//! served and are proactively deleted from whichever tier held them.
//! Lifecycle events (`hit`, `miss`, `set`, `delete`, `expired`, `clear`)
//! fan out over a broadcast channel for observers.

pub mod events;
mod file_tier;
pub mod tiered_cache;

// Re-export commonly used types
pub use events::{CacheEvent, CacheEventKind};
pub use tiered_cache::{CacheConfig, CacheMode, CacheStats, TieredCache};
