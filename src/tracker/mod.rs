// src/tracker/mod.rs
//! Operation lifecycle tracking with bounded-memory bookkeeping
//!
//! Every external tool invocation becomes one tracked operation: start and
//! stop timestamps, nested API-call sub-records, periodic CPU/memory
//! samples, and a final summary folded into process-wide aggregates. The
//! tracker retains at most a configured number of operations (least
//! recently touched evicted first) and at most 100 samples per operation,
//! so its footprint stays flat no matter how long the process runs.
//!
//! Instrumentation must never break the work it observes, so nothing in
//! this module returns an error or panics on malformed input — unknown
//! ids, duplicate completions, and bad keys are logged no-ops.

pub mod operation;
pub mod redact;
pub mod sampler;
#[allow(clippy::module_inception)]
pub mod tracker;

// Re-export commonly used types
pub use operation::{
    AggregateStats, ApiCallRecord, ApiCallStats, OperationSummary, ResourceSample,
    ThresholdExceedance, ThresholdKind, Thresholds, TopMetric, TrackedOperation,
    MAX_SAMPLES_PER_OPERATION,
};
pub use redact::{is_sensitive_key, redact_value, REDACTED};
pub use sampler::{HostMetrics, SystemSampler};
pub use tracker::{
    OperationBrief, OperationTracker, ProcessSnapshot, StatsReport, TrackerConfig,
};
