// src/gate/concurrency_gate.rs
//! Bounded-concurrency FIFO work gate
//!
//! Built on `tokio::sync::Semaphore`, whose permit queue is fair: waiters
//! are served in the order they arrived, which gives the dispatch-order
//! guarantee directly. The gate adds occupancy accounting on top.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::pool::factory::ResourceKind;
use crate::utils::errors::{GovernorError, Result};

/// Configuration for the per-kind concurrency gates
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum concurrently executing API tasks (default: 8)
    pub max_concurrent_api: usize,

    /// Maximum concurrently executing browser tasks (default: 2)
    pub max_concurrent_browser: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent_api: 8,
            max_concurrent_browser: 2,
        }
    }
}

impl GateConfig {
    /// Validate gate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_api == 0 {
            return Err(GovernorError::InvalidConfig(
                "max_concurrent_api must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_browser == 0 {
            return Err(GovernorError::InvalidConfig(
                "max_concurrent_browser must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn max_for(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::ApiClient => self.max_concurrent_api,
            ResourceKind::BrowserSession => self.max_concurrent_browser,
        }
    }
}

/// Gate occupancy snapshot
#[derive(Debug, Clone)]
pub struct GateStats {
    pub max_concurrent: usize,
    pub active: usize,
    pub queued: usize,
    pub peak_active: usize,
    pub scheduled: u64,
    pub completed: u64,
}

/// Decrements the active count even if the dispatched future panics.
struct DispatchGuard<'a> {
    active: &'a AtomicUsize,
    completed: &'a AtomicU64,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// FIFO queue bounding the number of simultaneously executing tasks
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    scheduled: AtomicU64,
    completed: AtomicU64,
}

impl ConcurrencyGate {
    /// Create a gate allowing `max_concurrent` tasks in flight
    pub fn new(max_concurrent: usize) -> Self {
        debug!(max_concurrent, "initializing concurrency gate");
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            scheduled: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Run `work` once a slot frees up, in submission order
    ///
    /// The returned value (or error, when `T` is a `Result`) flows back to
    /// this caller only; a failing task neither blocks nor cancels any
    /// other queued or in-flight task.
    pub async fn schedule<T, Fut>(&self, work: impl FnOnce() -> Fut) -> T
    where
        Fut: std::future::Future<Output = T>,
    {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        trace!("task queued on gate");

        // The semaphore lives and dies with the gate and is never closed,
        // so acquisition cannot observe a closed semaphore.
        let Ok(_permit) = self.semaphore.acquire().await else {
            unreachable!("gate semaphore closed while gate alive")
        };

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(active, Ordering::SeqCst);
        let _guard = DispatchGuard {
            active: &self.active,
            completed: &self.completed,
        };
        trace!(active, "task dispatched");

        work().await
    }

    /// Gate occupancy snapshot
    pub fn stats(&self) -> GateStats {
        let scheduled = self.scheduled.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        let active = self.active.load(Ordering::SeqCst);
        GateStats {
            max_concurrent: self.max_concurrent,
            active,
            queued: (scheduled - completed).saturating_sub(active as u64) as usize,
            peak_active: self.peak_active.load(Ordering::SeqCst),
            scheduled,
            completed,
        }
    }
}

/// One independently configured gate per resource kind
pub struct GateSet {
    api: ConcurrencyGate,
    browser: ConcurrencyGate,
}

impl GateSet {
    /// Build the per-kind gates from configuration
    pub fn new(config: &GateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            api: ConcurrencyGate::new(config.max_for(ResourceKind::ApiClient)),
            browser: ConcurrencyGate::new(config.max_for(ResourceKind::BrowserSession)),
        })
    }

    /// The gate governing `kind`
    pub fn gate(&self, kind: ResourceKind) -> &ConcurrencyGate {
        match kind {
            ResourceKind::ApiClient => &self.api,
            ResourceKind::BrowserSession => &self.browser,
        }
    }

    /// Occupancy snapshots for every kind
    pub fn stats(&self) -> Vec<(ResourceKind, GateStats)> {
        ResourceKind::ALL
            .iter()
            .map(|&kind| (kind, self.gate(kind).stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_concurrency_bound_and_wall_time() {
        let gate = Arc::new(ConcurrencyGate::new(2));
        let start = Instant::now();

        let mut handles = vec![];
        for _ in 0..5 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.schedule(|| async {
                    sleep(Duration::from_millis(100)).await;
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let elapsed = start.elapsed();
        // ceil(5 / 2) = 3 sequential batches of 100ms
        assert!(elapsed >= Duration::from_millis(300), "finished too fast: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "finished too slow: {elapsed:?}");

        let stats = gate.stats();
        assert!(stats.peak_active <= 2);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.completed, 5);
    }

    #[tokio::test]
    async fn test_dispatch_follows_submission_order() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = vec![];
        for i in 0..5u32 {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                gate.schedule(|| async move {
                    order.lock().push(i);
                    sleep(Duration::from_millis(20)).await;
                })
                .await;
            }));
            // Make submission order deterministic
            sleep(Duration::from_millis(5)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(order.lock().as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failure_does_not_affect_siblings() {
        let gate = Arc::new(ConcurrencyGate::new(2));

        let failing: std::result::Result<u32, String> = gate
            .schedule(|| async { Err("backend exploded".to_string()) })
            .await;
        let succeeding: std::result::Result<u32, String> =
            gate.schedule(|| async { Ok(7) }).await;

        assert!(failing.is_err());
        assert_eq!(succeeding.unwrap(), 7);

        let stats = gate.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test]
    async fn test_freed_slot_picks_up_queue_head() {
        let gate = Arc::new(ConcurrencyGate::new(1));

        let slow = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.schedule(|| async {
                    sleep(Duration::from_millis(50)).await;
                    "slow"
                })
                .await
            })
        };
        sleep(Duration::from_millis(5)).await;

        let queued = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.schedule(|| async { "queued" }).await })
        };
        sleep(Duration::from_millis(5)).await;
        assert_eq!(gate.stats().queued, 1);

        assert_eq!(slow.await.unwrap(), "slow");
        assert_eq!(queued.await.unwrap(), "queued");
        assert_eq!(gate.stats().queued, 0);
    }

    #[tokio::test]
    async fn test_gate_set_per_kind_limits() {
        let set = GateSet::new(&GateConfig {
            max_concurrent_api: 4,
            max_concurrent_browser: 1,
        })
        .unwrap();

        assert_eq!(set.gate(ResourceKind::ApiClient).stats().max_concurrent, 4);
        assert_eq!(set.gate(ResourceKind::BrowserSession).stats().max_concurrent, 1);

        let value = set
            .gate(ResourceKind::ApiClient)
            .schedule(|| async { 42 })
            .await;
        assert_eq!(value, 42);

        let stats = set.stats();
        assert_eq!(stats[0].1.completed, 1);
        assert_eq!(stats[1].1.completed, 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected_by_config() {
        let config = GateConfig {
            max_concurrent_api: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(GateSet::new(&config).is_err());
    }
}
