// src/pool/resource_pool.rs
//! Bounded pool of live API-client and browser-session handles
//!
//! Handles are keyed by configuration fingerprint and shared: a second
//! acquire with the same options returns a clone of the same `Arc` handle.
//! Each kind has a hard cap; creating past the cap first evicts the entry
//! of that kind with the oldest `last_used_at`. An entry evicted or
//! released while callers still hold clones is parked in a drain list and
//! closed only after the last outside clone drops, so no caller ever has a
//! live handle closed under it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pool::factory::{ResourceFactory, ResourceKind};
use crate::pool::fingerprint::Fingerprint;
use crate::utils::errors::{GovernorError, Result};

/// Configuration for the resource pool
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum live API-client handles (default: 8)
    pub max_api_clients: usize,

    /// Maximum live browser-session handles (default: 3)
    pub max_browser_sessions: usize,

    /// Idle age after which the reaper task evicts an entry, in
    /// milliseconds (default: 300_000)
    pub idle_timeout_ms: u64,

    /// Interval of the pool-owned reaper task in milliseconds; 0 disables
    /// the task and leaves reaping to the caller (default: 60_000)
    pub reap_interval_ms: u64,

    /// Whether the shared default fingerprint is exempt from idle reaping
    /// (default: true)
    pub exempt_shared_from_reaping: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_api_clients: 8,
            max_browser_sessions: 3,
            idle_timeout_ms: 300_000,
            reap_interval_ms: 60_000,
            exempt_shared_from_reaping: true,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_api_clients == 0 {
            return Err(GovernorError::InvalidConfig(
                "max_api_clients must be greater than 0".to_string(),
            ));
        }
        if self.max_browser_sessions == 0 {
            return Err(GovernorError::InvalidConfig(
                "max_browser_sessions must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn cap_for(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::ApiClient => self.max_api_clients,
            ResourceKind::BrowserSession => self.max_browser_sessions,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// A live handle registered in the pool
struct PooledEntry<H> {
    handle: Arc<H>,
    created_at: Instant,
    last_used_at: Instant,
}

impl<H> PooledEntry<H> {
    fn new(handle: Arc<H>) -> Self {
        let now = Instant::now();
        Self {
            handle,
            created_at: now,
            last_used_at: now,
        }
    }

    /// The pool holds one clone itself; anything beyond that is a caller.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.handle) > 1
    }
}

/// A handle removed from the pool while callers still referenced it
struct DrainedHandle<H> {
    kind: ResourceKind,
    fingerprint: Fingerprint,
    handle: Arc<H>,
}

/// Lifetime counters for the pool
#[derive(Debug, Clone, Default)]
pub struct PoolCounters {
    pub created: u64,
    pub reused: u64,
    pub evicted: u64,
    pub reaped: u64,
    pub released: u64,
}

/// Read-only snapshot of one resource kind
#[derive(Debug, Clone)]
pub struct KindStats {
    pub kind: ResourceKind,
    pub active: usize,
    pub max: usize,
    pub fingerprints: Vec<String>,
}

/// Read-only snapshot of the whole pool
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub kinds: Vec<KindStats>,
    pub draining: usize,
    pub counters: PoolCounters,
}

/// Combined entry maps, drain list, and counters under a single lock
struct PoolState<H> {
    api: HashMap<Fingerprint, PooledEntry<H>>,
    browser: HashMap<Fingerprint, PooledEntry<H>>,
    draining: Vec<DrainedHandle<H>>,
    counters: PoolCounters,
    shutdown: bool,
}

impl<H> PoolState<H> {
    fn new() -> Self {
        Self {
            api: HashMap::new(),
            browser: HashMap::new(),
            draining: Vec::new(),
            counters: PoolCounters::default(),
            shutdown: false,
        }
    }

    fn kind_entries(&self, kind: ResourceKind) -> &HashMap<Fingerprint, PooledEntry<H>> {
        match kind {
            ResourceKind::ApiClient => &self.api,
            ResourceKind::BrowserSession => &self.browser,
        }
    }

    fn kind_entries_mut(&mut self, kind: ResourceKind) -> &mut HashMap<Fingerprint, PooledEntry<H>> {
        match kind {
            ResourceKind::ApiClient => &mut self.api,
            ResourceKind::BrowserSession => &mut self.browser,
        }
    }

    fn lru_fingerprint(&self, kind: ResourceKind) -> Option<Fingerprint> {
        self.kind_entries(kind)
            .iter()
            .min_by_key(|(_, entry)| entry.last_used_at)
            .map(|(fingerprint, _)| fingerprint.clone())
    }
}

/// Inner shared state for the pool
struct PoolInner<F: ResourceFactory> {
    factory: Arc<F>,
    config: PoolConfig,
    state: Mutex<PoolState<F::Handle>>,
    /// Cancelled on `shutdown()`; stops the reaper task.
    cancel: CancellationToken,
}

/// Bounded, fingerprint-keyed pool of external resource handles
///
/// Cloning the pool is cheap and shares the underlying state. Must be
/// constructed inside a Tokio runtime (the reaper task and deferred handle
/// closes are spawned on it).
pub struct ResourcePool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Clone for ResourcePool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Create a new pool around a factory
    ///
    /// If `config.reap_interval_ms` is non-zero, a reaper task is spawned
    /// that evicts entries idle longer than `config.idle_timeout_ms`. The
    /// task is cancelled by [`shutdown`](Self::shutdown).
    pub fn new(factory: F, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();

        info!(
            max_api_clients = config.max_api_clients,
            max_browser_sessions = config.max_browser_sessions,
            "initializing resource pool"
        );

        let pool = Self {
            inner: Arc::new(PoolInner {
                factory: Arc::new(factory),
                config,
                state: Mutex::new(PoolState::new()),
                cancel: cancel.clone(),
            }),
        };

        if pool.inner.config.reap_interval_ms > 0 {
            let reaper = pool.clone();
            let interval = Duration::from_millis(pool.inner.config.reap_interval_ms);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancel.cancelled() => break,
                    }
                    let max_idle = reaper.inner.config.idle_timeout();
                    let reaped = reaper.reap_idle(max_idle).await;
                    if reaped > 0 {
                        debug!(reaped, "idle reaper evicted entries");
                    }
                }
            });
        }

        Ok(pool)
    }

    /// Acquire a handle for `kind` configured by `options`
    ///
    /// Returns the existing handle when one with the same fingerprint is
    /// live, refreshing its recency. Otherwise evicts the least recently
    /// used entry of that kind if the cap is reached, then constructs a
    /// new handle through the factory. The pool lock is held across
    /// creation, so concurrent acquisitions queue rather than jointly
    /// overshooting the cap.
    pub async fn acquire(&self, kind: ResourceKind, options: &Value) -> Result<Arc<F::Handle>> {
        let fingerprint = Fingerprint::from_options(options);
        let mut state = self.inner.state.lock().await;
        if state.shutdown {
            return Err(GovernorError::PoolShutdown);
        }
        self.sweep_draining(&mut state);

        if let Some(entry) = state.kind_entries_mut(kind).get_mut(&fingerprint) {
            entry.last_used_at = Instant::now();
            let handle = Arc::clone(&entry.handle);
            state.counters.reused += 1;
            debug!(kind = %kind, fingerprint = %fingerprint, "reusing pooled handle");
            return Ok(handle);
        }

        let cap = self.inner.config.cap_for(kind);
        while state.kind_entries(kind).len() >= cap {
            match state.lru_fingerprint(kind) {
                Some(lru) => {
                    debug!(
                        kind = %kind,
                        fingerprint = %lru,
                        "pool at capacity, evicting least recently used"
                    );
                    self.detach(&mut state, kind, &lru);
                    state.counters.evicted += 1;
                }
                None => break,
            }
        }

        let handle = Arc::new(self.inner.factory.create(kind, options).await?);
        state
            .kind_entries_mut(kind)
            .insert(fingerprint.clone(), PooledEntry::new(Arc::clone(&handle)));
        state.counters.created += 1;
        info!(kind = %kind, fingerprint = %fingerprint, "created pooled handle");
        Ok(handle)
    }

    /// Remove the entry for `fingerprint` if present, closing its handle
    ///
    /// Releasing a key that is not registered is a no-op.
    pub async fn release(&self, kind: ResourceKind, fingerprint: &Fingerprint) {
        let mut state = self.inner.state.lock().await;
        self.sweep_draining(&mut state);
        if state.kind_entries(kind).contains_key(fingerprint) {
            self.detach(&mut state, kind, fingerprint);
            state.counters.released += 1;
            debug!(kind = %kind, fingerprint = %fingerprint, "released pooled handle");
        } else {
            debug!(kind = %kind, fingerprint = %fingerprint, "release of unknown fingerprint ignored");
        }
    }

    /// Evict every entry idle longer than `max_idle`, returning the count
    ///
    /// The shared default fingerprint is skipped when
    /// `exempt_shared_from_reaping` is set.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let mut state = self.inner.state.lock().await;
        if state.shutdown {
            return 0;
        }
        self.sweep_draining(&mut state);

        let mut reaped = 0;
        for kind in ResourceKind::ALL {
            let stale: Vec<Fingerprint> = state
                .kind_entries(kind)
                .iter()
                .filter(|(fingerprint, entry)| {
                    if self.inner.config.exempt_shared_from_reaping && fingerprint.is_shared() {
                        return false;
                    }
                    entry.last_used_at.elapsed() > max_idle
                })
                .map(|(fingerprint, _)| fingerprint.clone())
                .collect();

            for fingerprint in stale {
                debug!(kind = %kind, fingerprint = %fingerprint, "reaping idle handle");
                self.detach(&mut state, kind, &fingerprint);
                reaped += 1;
            }
        }
        state.counters.reaped += reaped as u64;
        reaped
    }

    /// Read-only snapshot of pool occupancy and counters
    pub async fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock().await;
        let kinds = ResourceKind::ALL
            .iter()
            .map(|&kind| KindStats {
                kind,
                active: state.kind_entries(kind).len(),
                max: self.inner.config.cap_for(kind),
                fingerprints: state
                    .kind_entries(kind)
                    .keys()
                    .map(|fingerprint| fingerprint.to_string())
                    .collect(),
            })
            .collect();

        PoolStats {
            kinds,
            draining: state.draining.len(),
            counters: state.counters.clone(),
        }
    }

    /// Cancel the reaper and close every registered and drained handle
    ///
    /// Close failures are logged and absorbed. Subsequent acquisitions
    /// fail with [`GovernorError::PoolShutdown`].
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut to_close: Vec<(ResourceKind, Arc<F::Handle>)> = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            for kind in ResourceKind::ALL {
                for (_, entry) in state.kind_entries_mut(kind).drain() {
                    to_close.push((kind, entry.handle));
                }
            }
            for drained in state.draining.drain(..) {
                to_close.push((drained.kind, drained.handle));
            }
        }

        info!(handles = to_close.len(), "shutting down resource pool");

        let factory = Arc::clone(&self.inner.factory);
        let closes = to_close.iter().map(|(kind, handle)| {
            let factory = Arc::clone(&factory);
            async move {
                if let Err(e) = factory.close(*kind, handle).await {
                    warn!(kind = %kind, error = %e, "failed to close handle during shutdown");
                }
            }
        });
        futures::future::join_all(closes).await;
    }

    /// Remove an entry from the map and close it, deferring the close to
    /// the drain list while callers still hold clones.
    fn detach(&self, state: &mut PoolState<F::Handle>, kind: ResourceKind, fingerprint: &Fingerprint) {
        let Some(entry) = state.kind_entries_mut(kind).remove(fingerprint) else {
            return;
        };
        if entry.in_use() {
            debug!(
                kind = %kind,
                fingerprint = %fingerprint,
                age_secs = entry.created_at.elapsed().as_secs(),
                "detached handle still referenced, deferring close"
            );
            state.draining.push(DrainedHandle {
                kind,
                fingerprint: fingerprint.clone(),
                handle: entry.handle,
            });
        } else {
            self.spawn_close(kind, entry.handle);
        }
    }

    /// Close drained handles whose last outside clone has dropped.
    fn sweep_draining(&self, state: &mut PoolState<F::Handle>) {
        let mut index = 0;
        while index < state.draining.len() {
            if Arc::strong_count(&state.draining[index].handle) == 1 {
                let drained = state.draining.swap_remove(index);
                debug!(
                    kind = %drained.kind,
                    fingerprint = %drained.fingerprint,
                    "last reference dropped, closing drained handle"
                );
                self.spawn_close(drained.kind, drained.handle);
            } else {
                index += 1;
            }
        }
    }

    /// Close a handle on a detached task so pool calls never wait on
    /// factory teardown. Failures are logged, never propagated.
    fn spawn_close(&self, kind: ResourceKind, handle: Arc<F::Handle>) {
        let factory = Arc::clone(&self.inner.factory);
        tokio::spawn(async move {
            if let Err(e) = factory.close(kind, &handle).await {
                warn!(kind = %kind, error = %e, "failed to close pooled handle");
            }
        });
    }
}
