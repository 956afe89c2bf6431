// src/lib.rs
//! Pagecraft Resource Governance Library
//!
//! This library bounds and observes the expensive external resources the
//! Pagecraft CMS automation engine leans on: REST API clients and headless
//! browser sessions.
//!
//! # Architecture
//!
//! The governor is structured into four independent components:
//!
//! - **pool**: Bounded, fingerprint-keyed pooling of live resource handles
//! - **gate**: FIFO-fair limits on concurrently executing work per kind
//! - **tracker**: Lifecycle and CPU/memory tracking of tool invocations
//! - **cache**: Tiered (memory + file) caching of expensive fetches
//! - **utils**: Errors and aggregate configuration
//!
//! Components are plain constructible instances: no globals, and every
//! background timer is a cancellable task stopped by that component's
//! `shutdown()`, so instances can coexist freely (one per test, say).

// Public module exports
pub mod cache;
pub mod gate;
pub mod pool;
pub mod tracker;
pub mod utils;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheEvent, CacheEventKind, CacheMode, TieredCache};
pub use gate::{ConcurrencyGate, GateConfig, GateSet};
pub use pool::{Fingerprint, PoolConfig, ResourceFactory, ResourceKind, ResourcePool};
pub use tracker::{OperationTracker, StatsReport, TopMetric, TrackerConfig};
pub use utils::config::GovernorConfig;
pub use utils::errors::{GovernorError, Result};
pub use utils::logging::init_tracing;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
