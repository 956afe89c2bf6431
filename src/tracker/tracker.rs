// src/tracker/tracker.rs
//! Lifecycle tracking for external tool invocations
//!
//! The tracker retains a bounded number of operations, evicting the least
//! recently touched when the cap is reached. Each live operation owns a
//! sampling task that appends memory/CPU readings until the operation is
//! finalized, and a tracker-owned task periodically rewrites the stats
//! snapshot when a path is configured.
//!
//! No public method here ever panics or returns an error for malformed
//! input: unknown ids and invalid calls are logged and answered with
//! `None`/`false` so instrumentation never breaks the operation it is
//! observing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use ulid::Ulid;

use crate::tracker::operation::{
    AggregateStats, ApiCallRecord, OperationSummary, ThresholdExceedance, ThresholdKind,
    Thresholds, TopMetric, TrackedOperation,
};
use crate::tracker::redact::redact_value;
use crate::tracker::sampler::{HostMetrics, SystemSampler};
use crate::utils::errors::{GovernorError, Result};

/// Configuration for the operation tracker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum retained operations, live and finalized (default: 100)
    pub max_operations: usize,

    /// Interval between resource samples per operation, in milliseconds
    /// (default: 5_000)
    pub sampling_interval_ms: u64,

    /// Interval between stats snapshot rewrites, in milliseconds
    /// (default: 60_000)
    pub save_interval_ms: u64,

    /// Where to persist the stats snapshot; `None` disables persistence
    /// (default: `None`)
    pub snapshot_path: Option<PathBuf>,

    /// Limits compared against each finalized operation
    pub thresholds: Thresholds,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_operations: 100,
            sampling_interval_ms: 5_000,
            save_interval_ms: 60_000,
            snapshot_path: None,
            thresholds: Thresholds::default(),
        }
    }
}

impl TrackerConfig {
    /// Validate tracker configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_operations == 0 {
            return Err(GovernorError::InvalidConfig(
                "max_operations must be greater than 0".to_string(),
            ));
        }
        if self.sampling_interval_ms == 0 {
            return Err(GovernorError::InvalidConfig(
                "sampling_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.save_interval_ms == 0 {
            return Err(GovernorError::InvalidConfig(
                "save_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Condensed view of one operation for non-detailed lookups
#[derive(Debug, Clone, Serialize)]
pub struct OperationBrief {
    pub id: String,
    pub tool_name: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub api_calls: usize,
    pub samples: usize,
    pub finalized: bool,
}

impl OperationBrief {
    fn from_operation(op: &TrackedOperation) -> Self {
        Self {
            id: op.id.clone(),
            tool_name: op.tool_name.clone(),
            user_id: op.user_id.clone(),
            started_at: op.started_at,
            completed_at: op.completed_at,
            duration_ms: op.summary.as_ref().map(|summary| summary.duration_ms),
            api_calls: op.api_calls.len(),
            samples: op.samples.len(),
            finalized: op.is_finalized(),
        }
    }
}

/// Process-wide snapshot: live host metrics merged with the aggregates
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub host: HostMetrics,
    pub aggregates: AggregateStats,
    pub tracked_operations: usize,
    pub active_operations: usize,
}

/// What `get_stats` answers with
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatsReport {
    /// Full record of one operation (`detailed = true`)
    Operation(Box<TrackedOperation>),
    /// Condensed view of one operation
    Brief(OperationBrief),
    /// Process-wide snapshot (no id given)
    Process(ProcessSnapshot),
}

/// Persisted snapshot format
#[derive(Debug, Serialize, Deserialize)]
struct StatsSnapshot {
    saved_at: DateTime<Utc>,
    aggregates: AggregateStats,
    operations: Vec<OperationSummary>,
}

struct OpSlot {
    op: TrackedOperation,
    sampler_cancel: CancellationToken,
}

struct TrackerState {
    operations: HashMap<String, OpSlot>,
}

struct TrackerInner {
    config: TrackerConfig,
    state: Mutex<TrackerState>,
    aggregates: RwLock<AggregateStats>,
    sampler: Mutex<SystemSampler>,
    /// Cancelled on `shutdown()`; parent of every sampler token.
    cancel: CancellationToken,
}

/// Tracks the lifecycle and consumption of external tool invocations
///
/// Cloning is cheap and shares state. Must be constructed inside a Tokio
/// runtime when snapshot persistence is configured, and `start_tracking`
/// always requires one (it spawns the sampling task).
pub struct OperationTracker {
    inner: Arc<TrackerInner>,
}

impl Clone for OperationTracker {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl OperationTracker {
    /// Create a tracker, seeding aggregates from a previous snapshot if one
    /// is readable at the configured path
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        let aggregates = config
            .snapshot_path
            .as_deref()
            .and_then(load_snapshot_aggregates)
            .unwrap_or_default();

        let cancel = CancellationToken::new();
        let tracker = Self {
            inner: Arc::new(TrackerInner {
                config,
                state: Mutex::new(TrackerState {
                    operations: HashMap::new(),
                }),
                aggregates: RwLock::new(aggregates),
                sampler: Mutex::new(SystemSampler::new()),
                cancel: cancel.clone(),
            }),
        };

        if tracker.inner.config.snapshot_path.is_some() {
            let saver = tracker.clone();
            let interval = Duration::from_millis(tracker.inner.config.save_interval_ms);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancel.cancelled() => break,
                    }
                    saver.write_snapshot().await;
                }
            });
        }

        Ok(tracker)
    }

    /// Begin tracking an operation, returning its id
    ///
    /// Generates a ULID when no id is given. At the retention cap the least
    /// recently touched operation is evicted first, finalized or not.
    /// Parameters are stored redacted.
    pub fn start_tracking(
        &self,
        id: Option<String>,
        tool_name: &str,
        params: &Value,
        user_id: &str,
    ) -> Option<String> {
        let id = id.unwrap_or_else(|| Ulid::new().to_string());
        let baseline = self.inner.sampler.lock().sample();
        let redacted = redact_value(params);
        let sampler_cancel = self.inner.cancel.child_token();

        {
            let mut state = self.inner.state.lock();
            if let Some(previous) = state.operations.remove(&id) {
                warn!(id = %id, "operation id restarted, replacing existing record");
                previous.sampler_cancel.cancel();
            }

            while state.operations.len() >= self.inner.config.max_operations {
                let oldest = state
                    .operations
                    .values()
                    .min_by_key(|slot| slot.op.last_touched)
                    .map(|slot| slot.op.id.clone());
                let Some(oldest) = oldest else { break };
                if let Some(evicted) = state.operations.remove(&oldest) {
                    evicted.sampler_cancel.cancel();
                    debug!(
                        id = %oldest,
                        finalized = evicted.op.is_finalized(),
                        "retention cap reached, evicting least recently touched operation"
                    );
                }
            }

            let op = TrackedOperation::new(
                id.clone(),
                tool_name.to_string(),
                user_id.to_string(),
                redacted,
                baseline,
            );
            state.operations.insert(
                id.clone(),
                OpSlot {
                    op,
                    sampler_cancel: sampler_cancel.clone(),
                },
            );
        }

        let tracker = self.clone();
        let op_id = id.clone();
        let interval = Duration::from_millis(self.inner.config.sampling_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = sampler_cancel.cancelled() => break,
                }
                let sample = tracker.inner.sampler.lock().sample();
                let mut state = tracker.inner.state.lock();
                match state.operations.get_mut(&op_id) {
                    Some(slot) if !slot.op.is_finalized() => slot.op.push_sample(sample),
                    _ => break,
                }
            }
        });

        debug!(id = %id, tool = tool_name, user = user_id, "started tracking operation");
        Some(id)
    }

    /// Record the start of an API call within an operation
    ///
    /// Unknown operation ids are ignored and answered with `None`.
    pub fn track_api_call(
        &self,
        id: &str,
        endpoint: &str,
        method: &str,
        params: &Value,
    ) -> Option<String> {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.operations.get_mut(id) else {
            debug!(id, endpoint, "track_api_call for unknown operation ignored");
            return None;
        };

        let call_id = Ulid::new().to_string();
        trace!(id, endpoint, method, params = %redact_value(params), "tracking api call");
        slot.op.api_calls.push(ApiCallRecord {
            call_id: call_id.clone(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            success: None,
            status_code: None,
            error: None,
        });
        slot.op.touch();
        Some(call_id)
    }

    /// Record the outcome of a previously tracked API call
    ///
    /// Returns whether a record was updated; unknown ids are no-ops.
    pub fn complete_api_call(
        &self,
        id: &str,
        call_id: &str,
        success: bool,
        status_code: Option<u16>,
        error: Option<String>,
    ) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.operations.get_mut(id) else {
            debug!(id, call_id, "complete_api_call for unknown operation ignored");
            return false;
        };
        let Some(call) = slot
            .op
            .api_calls
            .iter_mut()
            .find(|call| call.call_id == call_id)
        else {
            debug!(id, call_id, "complete_api_call for unknown call ignored");
            return false;
        };

        let now = Utc::now();
        call.completed_at = Some(now);
        call.duration_ms = Some((now - call.started_at).num_milliseconds().max(0) as u64);
        call.success = Some(success);
        call.status_code = status_code;
        call.error = error;
        slot.op.touch();
        true
    }

    /// Finalize an operation: stop sampling, compute its summary, and fold
    /// it into the process-wide aggregates
    ///
    /// Threshold exceedances are recorded on the summary without failing
    /// the operation. Stopping an unknown id returns `None`; stopping an
    /// already-finalized operation returns its existing summary.
    pub fn stop_tracking(
        &self,
        id: &str,
        success: bool,
        result: Option<&Value>,
    ) -> Option<OperationSummary> {
        if let Some(result) = result {
            trace!(id, result = %redact_value(result), "operation result");
        }

        let final_sample = self.inner.sampler.lock().sample();
        let summary = {
            let mut state = self.inner.state.lock();
            let Some(slot) = state.operations.get_mut(id) else {
                debug!(id, "stop_tracking for unknown operation ignored");
                return None;
            };
            if slot.op.is_finalized() {
                debug!(id, "operation already finalized");
                return slot.op.summary.clone();
            }

            slot.sampler_cancel.cancel();
            slot.op.push_sample(final_sample.clone());

            let completed_at = Utc::now();
            let duration_ms = slot.op.started_instant.elapsed().as_millis() as u64;
            let (peak_memory, avg_memory, peak_cpu, avg_cpu) = slot.op.sample_extremes();
            let api_calls = slot.op.api_call_stats();
            let memory_delta =
                final_sample.memory_bytes as i64 - slot.op.baseline.memory_bytes as i64;
            let cpu_delta = final_sample.cpu_percent - slot.op.baseline.cpu_percent;

            let thresholds = &self.inner.config.thresholds;
            let mut exceeded = Vec::new();
            if peak_cpu > thresholds.max_cpu_percent {
                exceeded.push(ThresholdExceedance {
                    kind: ThresholdKind::Cpu,
                    limit: f64::from(thresholds.max_cpu_percent),
                    observed: f64::from(peak_cpu),
                });
            }
            if peak_memory > thresholds.max_memory_bytes {
                exceeded.push(ThresholdExceedance {
                    kind: ThresholdKind::Memory,
                    limit: thresholds.max_memory_bytes as f64,
                    observed: peak_memory as f64,
                });
            }
            if let Some(slowest) = slot.op.slowest_call_ms() {
                if slowest > thresholds.max_response_time_ms {
                    exceeded.push(ThresholdExceedance {
                        kind: ThresholdKind::ResponseTime,
                        limit: thresholds.max_response_time_ms as f64,
                        observed: slowest as f64,
                    });
                }
            }
            if duration_ms > thresholds.max_operation_time_ms {
                exceeded.push(ThresholdExceedance {
                    kind: ThresholdKind::OperationTime,
                    limit: thresholds.max_operation_time_ms as f64,
                    observed: duration_ms as f64,
                });
            }
            for exceedance in &exceeded {
                warn!(
                    id,
                    kind = ?exceedance.kind,
                    limit = exceedance.limit,
                    observed = exceedance.observed,
                    "operation exceeded threshold"
                );
            }

            let summary = OperationSummary {
                id: slot.op.id.clone(),
                tool_name: slot.op.tool_name.clone(),
                user_id: slot.op.user_id.clone(),
                success,
                started_at: slot.op.started_at,
                completed_at,
                duration_ms,
                memory_delta_bytes: memory_delta,
                cpu_delta_percent: cpu_delta,
                peak_memory_bytes: peak_memory,
                avg_memory_bytes: avg_memory,
                peak_cpu_percent: peak_cpu,
                avg_cpu_percent: avg_cpu,
                api_calls,
                thresholds_exceeded: exceeded,
            };
            slot.op.summary = Some(summary.clone());
            slot.op.completed_at = Some(completed_at);
            slot.op.touch();
            summary
        };

        self.inner.aggregates.write().fold(&summary);
        info!(
            id,
            tool = %summary.tool_name,
            duration_ms = summary.duration_ms,
            success,
            "operation finalized"
        );
        Some(summary)
    }

    /// Look up one operation (detailed or condensed), or take a
    /// process-wide snapshot when no id is given
    pub fn get_stats(&self, id: Option<&str>, detailed: bool) -> Option<StatsReport> {
        match id {
            Some(id) => {
                let state = self.inner.state.lock();
                let slot = state.operations.get(id)?;
                if detailed {
                    Some(StatsReport::Operation(Box::new(slot.op.clone())))
                } else {
                    Some(StatsReport::Brief(OperationBrief::from_operation(&slot.op)))
                }
            }
            None => {
                let host = self.inner.sampler.lock().host_metrics();
                let (tracked, active) = {
                    let state = self.inner.state.lock();
                    let tracked = state.operations.len();
                    let active = state
                        .operations
                        .values()
                        .filter(|slot| !slot.op.is_finalized())
                        .count();
                    (tracked, active)
                };
                Some(StatsReport::Process(ProcessSnapshot {
                    host,
                    aggregates: self.inner.aggregates.read().clone(),
                    tracked_operations: tracked,
                    active_operations: active,
                }))
            }
        }
    }

    /// The `limit` highest-ranked finalized operations by `metric`
    pub fn get_top_operations(&self, limit: usize, metric: TopMetric) -> Vec<OperationSummary> {
        let mut summaries: Vec<OperationSummary> = {
            let state = self.inner.state.lock();
            state
                .operations
                .values()
                .filter_map(|slot| slot.op.summary.clone())
                .collect()
        };
        summaries.sort_by(|a, b| {
            b.metric(metric)
                .partial_cmp(&a.metric(metric))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        summaries.truncate(limit);
        summaries
    }

    /// Copy of the process-wide aggregate counters
    pub fn aggregates(&self) -> AggregateStats {
        self.inner.aggregates.read().clone()
    }

    /// Cancel every sampling task and the snapshot task, then write a
    /// final snapshot if persistence is configured
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if self.inner.config.snapshot_path.is_some() {
            self.write_snapshot().await;
        }
        info!("operation tracker shut down");
    }

    /// Rewrite the stats snapshot; failures are logged and absorbed
    async fn write_snapshot(&self) {
        let Some(path) = &self.inner.config.snapshot_path else {
            return;
        };
        let snapshot = {
            let state = self.inner.state.lock();
            StatsSnapshot {
                saved_at: Utc::now(),
                aggregates: self.inner.aggregates.read().clone(),
                operations: state
                    .operations
                    .values()
                    .filter_map(|slot| slot.op.summary.clone())
                    .collect(),
            }
        };
        let operations = snapshot.operations.len();
        let json = match serde_json::to_vec_pretty(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize stats snapshot");
                return;
            }
        };
        match tokio::fs::write(path, json).await {
            Ok(()) => debug!(path = %path.display(), operations, "stats snapshot written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write stats snapshot"),
        }
    }
}

/// Best-effort read of a previous snapshot's aggregates
fn load_snapshot_aggregates(path: &Path) -> Option<AggregateStats> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice::<StatsSnapshot>(&bytes) {
        Ok(snapshot) => {
            debug!(
                path = %path.display(),
                operations_completed = snapshot.aggregates.operations_completed,
                "seeded aggregates from previous snapshot"
            );
            Some(snapshot.aggregates)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable stats snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::sleep;

    fn tracker_with(config: TrackerConfig) -> OperationTracker {
        OperationTracker::new(config).unwrap()
    }

    fn fast_sampling() -> TrackerConfig {
        TrackerConfig {
            sampling_interval_ms: 20,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_produces_summary() {
        let tracker = tracker_with(fast_sampling());

        let id = tracker
            .start_tracking(None, "publish_page", &json!({"page": "home"}), "editor-7")
            .unwrap();

        let ok_call = tracker
            .track_api_call(&id, "/api/pages", "POST", &json!({}))
            .unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(tracker.complete_api_call(&id, &ok_call, true, Some(201), None));

        let bad_call = tracker
            .track_api_call(&id, "/api/assets", "PUT", &json!({}))
            .unwrap();
        assert!(tracker.complete_api_call(
            &id,
            &bad_call,
            false,
            Some(503),
            Some("upstream unavailable".to_string()),
        ));

        let summary = tracker.stop_tracking(&id, true, None).unwrap();
        assert!(summary.success);
        assert_eq!(summary.api_calls.total, 2);
        assert_eq!(summary.api_calls.succeeded, 1);
        assert_eq!(summary.api_calls.failed, 1);
        assert!(summary.duration_ms >= 10);

        let aggregates = tracker.aggregates();
        assert_eq!(aggregates.operations_completed, 1);
        assert_eq!(aggregates.operations_failed, 0);
        assert_eq!(aggregates.api_calls_total, 2);
    }

    #[tokio::test]
    async fn test_bounded_retention_evicts_least_recently_touched() {
        let tracker = tracker_with(TrackerConfig {
            max_operations: 2,
            ..Default::default()
        });

        tracker
            .start_tracking(Some("a".to_string()), "tool", &json!({}), "u")
            .unwrap();
        sleep(Duration::from_millis(5)).await;
        tracker
            .start_tracking(Some("b".to_string()), "tool", &json!({}), "u")
            .unwrap();
        sleep(Duration::from_millis(5)).await;

        // Touch "a" so "b" becomes the least recently touched
        tracker.track_api_call("a", "/x", "GET", &json!({}));

        tracker
            .start_tracking(Some("c".to_string()), "tool", &json!({}), "u")
            .unwrap();

        assert!(tracker.get_stats(Some("b"), false).is_none());
        assert!(tracker.get_stats(Some("a"), false).is_some());
        assert!(tracker.get_stats(Some("c"), false).is_some());
    }

    #[tokio::test]
    async fn test_params_are_stored_redacted() {
        let tracker = tracker_with(TrackerConfig::default());

        let id = tracker
            .start_tracking(
                None,
                "connect",
                &json!({"password": "x", "nested": {"token": "y"}, "page": "home"}),
                "u",
            )
            .unwrap();

        let Some(StatsReport::Operation(op)) = tracker.get_stats(Some(&id), true) else {
            panic!("expected detailed operation report");
        };
        assert_eq!(op.params["password"], "[REDACTED]");
        assert_eq!(op.params["nested"]["token"], "[REDACTED]");
        assert_eq!(op.params["page"], "home");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_noops() {
        let tracker = tracker_with(TrackerConfig::default());

        assert!(tracker
            .track_api_call("ghost", "/x", "GET", &json!({}))
            .is_none());
        assert!(!tracker.complete_api_call("ghost", "call", true, None, None));
        assert!(tracker.stop_tracking("ghost", true, None).is_none());
        assert!(tracker.get_stats(Some("ghost"), true).is_none());

        // Unknown call id on a live operation is also a no-op
        let id = tracker
            .start_tracking(None, "tool", &json!({}), "u")
            .unwrap();
        assert!(!tracker.complete_api_call(&id, "missing-call", true, None, None));
    }

    #[tokio::test]
    async fn test_sampling_appends_until_stopped() {
        let tracker = tracker_with(fast_sampling());

        let id = tracker
            .start_tracking(None, "tool", &json!({}), "u")
            .unwrap();
        sleep(Duration::from_millis(100)).await;
        tracker.stop_tracking(&id, true, None).unwrap();

        let Some(StatsReport::Operation(op)) = tracker.get_stats(Some(&id), true) else {
            panic!("expected detailed operation report");
        };
        let settled = op.samples.len();
        assert!(settled >= 2, "expected several samples, got {settled}");

        // Sampler is cancelled at finalize time
        sleep(Duration::from_millis(100)).await;
        let Some(StatsReport::Operation(op)) = tracker.get_stats(Some(&id), true) else {
            panic!("expected detailed operation report");
        };
        assert_eq!(op.samples.len(), settled);
    }

    #[tokio::test]
    async fn test_top_operations_ranked_by_duration() {
        let tracker = tracker_with(TrackerConfig::default());

        for (id, pause_ms) in [("short", 0u64), ("long", 60), ("medium", 25)] {
            tracker
                .start_tracking(Some(id.to_string()), "tool", &json!({}), "u")
                .unwrap();
            sleep(Duration::from_millis(pause_ms)).await;
            tracker.stop_tracking(id, true, None).unwrap();
        }

        let top = tracker.get_top_operations(2, TopMetric::Duration);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, "long");
        assert_eq!(top[1].id, "medium");
    }

    #[tokio::test]
    async fn test_threshold_exceedance_recorded_without_failing() {
        let tracker = tracker_with(TrackerConfig {
            thresholds: Thresholds {
                max_operation_time_ms: 1,
                ..Default::default()
            },
            ..Default::default()
        });

        let id = tracker
            .start_tracking(None, "tool", &json!({}), "u")
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        let summary = tracker.stop_tracking(&id, true, None).unwrap();

        assert!(summary
            .thresholds_exceeded
            .iter()
            .any(|e| e.kind == ThresholdKind::OperationTime));
        assert!(summary.success);
        assert_eq!(tracker.aggregates().thresholds_exceeded, 1);
    }

    #[tokio::test]
    async fn test_restarting_an_id_replaces_the_record() {
        let tracker = tracker_with(TrackerConfig::default());

        tracker
            .start_tracking(Some("dup".to_string()), "tool", &json!({}), "u")
            .unwrap();
        tracker.track_api_call("dup", "/x", "GET", &json!({}));
        tracker
            .start_tracking(Some("dup".to_string()), "tool", &json!({}), "u")
            .unwrap();

        let Some(StatsReport::Operation(op)) = tracker.get_stats(Some("dup"), true) else {
            panic!("expected detailed operation report");
        };
        assert!(op.api_calls.is_empty());
    }

    #[tokio::test]
    async fn test_process_snapshot_merges_host_metrics() {
        let tracker = tracker_with(TrackerConfig::default());

        let id = tracker
            .start_tracking(None, "tool", &json!({}), "u")
            .unwrap();

        let Some(StatsReport::Process(snapshot)) = tracker.get_stats(None, false) else {
            panic!("expected process snapshot");
        };
        assert_eq!(snapshot.tracked_operations, 1);
        assert_eq!(snapshot.active_operations, 1);
        assert!(snapshot.host.total_memory_bytes > 0);

        tracker.stop_tracking(&id, true, None).unwrap();
        let Some(StatsReport::Process(snapshot)) = tracker.get_stats(None, false) else {
            panic!("expected process snapshot");
        };
        assert_eq!(snapshot.active_operations, 0);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_seeds_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governor-stats.json");

        let tracker = tracker_with(TrackerConfig {
            snapshot_path: Some(path.clone()),
            ..Default::default()
        });
        let id = tracker
            .start_tracking(None, "tool", &json!({}), "u")
            .unwrap();
        tracker.stop_tracking(&id, true, None).unwrap();
        tracker.shutdown().await;

        let bytes = std::fs::read(&path).unwrap();
        let snapshot: StatsSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot.aggregates.operations_completed, 1);
        assert_eq!(snapshot.operations.len(), 1);

        let revived = tracker_with(TrackerConfig {
            snapshot_path: Some(path),
            ..Default::default()
        });
        assert_eq!(revived.aggregates().operations_completed, 1);
        revived.shutdown().await;
    }
}
