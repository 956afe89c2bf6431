// src/pool/mod.rs
//! Bounded pooling of expensive external handles
//!
//! The automation layer talks to two kinds of costly resources: REST API
//! clients (keep-alive sockets, auth state) and headless browser sessions
//! (a whole process each). This module keeps at most a configured number of
//! each alive, keyed by a fingerprint of their configuration, so identical
//! requests share a handle instead of constructing a new one.
//!
//! # Architecture
//!
//! ```text
//! acquire(kind, options)
//!     │
//!     ├─ fingerprint(options) ──► hit?  ──► refresh last_used_at, share Arc
//!     │
//!     └─ miss ──► at cap? ──► evict LRU entry of that kind
//!                    │            │
//!                    │            └─ still referenced ──► drain list
//!                    │                (closed when the last clone drops)
//!                    └─ factory.create() ──► register ──► share Arc
//! ```
//!
//! Idle entries are additionally evicted by a reaper, either driven by the
//! caller through [`ResourcePool::reap_idle`] or by the pool-owned timer
//! task configured via [`PoolConfig::reap_interval_ms`].

pub mod factory;
pub mod fingerprint;
pub mod resource_pool;

// Re-export commonly used types
pub use factory::{ResourceFactory, ResourceKind};
pub use fingerprint::{Fingerprint, SHARED_FINGERPRINT};
pub use resource_pool::{KindStats, PoolConfig, PoolCounters, PoolStats, ResourcePool};
