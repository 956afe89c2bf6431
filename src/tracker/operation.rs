// src/tracker/operation.rs
//! Record types for tracked operations
//!
//! One [`TrackedOperation`] covers a single external tool invocation from
//! `start_tracking` to `stop_tracking`: the redacted parameter signature,
//! periodic resource samples, nested API-call sub-records, and the final
//! summary once the operation is finalized.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retained samples per operation; oldest are dropped beyond this.
pub const MAX_SAMPLES_PER_OPERATION: usize = 100;

/// One point-in-time resource measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

/// Sub-record for one API call made during an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub call_id: String,
    pub endpoint: String,
    pub method: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub success: Option<bool>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// Aggregated API-call figures for one operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiCallStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mean duration over completed calls, in milliseconds
    pub avg_duration_ms: f64,
}

/// Limits an operation is compared against at finalize time
///
/// Exceedances are recorded on the summary, never failing the operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Peak CPU percentage (default: 80.0)
    pub max_cpu_percent: f32,

    /// Peak memory in bytes (default: 1 GiB)
    pub max_memory_bytes: u64,

    /// Slowest tolerated API call, in milliseconds (default: 10_000)
    pub max_response_time_ms: u64,

    /// Longest tolerated operation, in milliseconds (default: 120_000)
    pub max_operation_time_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_cpu_percent: 80.0,
            max_memory_bytes: 1_073_741_824,
            max_response_time_ms: 10_000,
            max_operation_time_ms: 120_000,
        }
    }
}

/// Which configured limit was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    Cpu,
    Memory,
    ResponseTime,
    OperationTime,
}

/// One recorded limit exceedance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdExceedance {
    pub kind: ThresholdKind,
    pub limit: f64,
    pub observed: f64,
}

/// Metric used to rank completed operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopMetric {
    Duration,
    Memory,
    Cpu,
}

/// Final rollup of one finalized operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSummary {
    pub id: String,
    pub tool_name: String,
    pub user_id: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub memory_delta_bytes: i64,
    pub cpu_delta_percent: f32,
    pub peak_memory_bytes: u64,
    pub avg_memory_bytes: u64,
    pub peak_cpu_percent: f32,
    pub avg_cpu_percent: f32,
    pub api_calls: ApiCallStats,
    pub thresholds_exceeded: Vec<ThresholdExceedance>,
}

impl OperationSummary {
    /// Ranking value for [`TopMetric`] ordering
    pub fn metric(&self, metric: TopMetric) -> f64 {
        match metric {
            TopMetric::Duration => self.duration_ms as f64,
            TopMetric::Memory => self.peak_memory_bytes as f64,
            TopMetric::Cpu => f64::from(self.peak_cpu_percent),
        }
    }
}

/// Process-wide rollup across all finalized operations
///
/// Averages use a weighted incremental mean so the figures stay
/// numerically stable regardless of how many summaries fold in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    pub operations_completed: u64,
    pub operations_failed: u64,
    pub avg_duration_ms: f64,
    pub avg_memory_delta_bytes: f64,
    pub avg_cpu_percent: f64,
    pub api_calls_total: u64,
    pub api_calls_failed: u64,
    pub thresholds_exceeded: u64,
}

impl AggregateStats {
    /// Fold one finalized operation into the running totals
    pub fn fold(&mut self, summary: &OperationSummary) {
        let count = self.operations_completed as f64;
        let next = count + 1.0;
        self.avg_duration_ms += (summary.duration_ms as f64 - self.avg_duration_ms) / next;
        self.avg_memory_delta_bytes +=
            (summary.memory_delta_bytes as f64 - self.avg_memory_delta_bytes) / next;
        self.avg_cpu_percent += (f64::from(summary.avg_cpu_percent) - self.avg_cpu_percent) / next;

        self.operations_completed += 1;
        if !summary.success {
            self.operations_failed += 1;
        }
        self.api_calls_total += summary.api_calls.total as u64;
        self.api_calls_failed += summary.api_calls.failed as u64;
        self.thresholds_exceeded += summary.thresholds_exceeded.len() as u64;
    }
}

/// Live record of one operation being tracked
#[derive(Debug, Clone, Serialize)]
pub struct TrackedOperation {
    pub id: String,
    pub tool_name: String,
    pub user_id: String,
    /// Parameter signature with secret-bearing values redacted
    pub params: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub baseline: ResourceSample,
    pub samples: VecDeque<ResourceSample>,
    pub api_calls: Vec<ApiCallRecord>,
    pub summary: Option<OperationSummary>,

    #[serde(skip)]
    pub(crate) started_instant: Instant,
    /// Refreshed on every mutation; drives LRU eviction.
    #[serde(skip)]
    pub(crate) last_touched: Instant,
}

impl TrackedOperation {
    pub fn new(
        id: String,
        tool_name: String,
        user_id: String,
        params: Value,
        baseline: ResourceSample,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            tool_name,
            user_id,
            params,
            started_at: Utc::now(),
            completed_at: None,
            baseline,
            samples: VecDeque::new(),
            api_calls: Vec::new(),
            summary: None,
            started_instant: now,
            last_touched: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    /// Append a sample, dropping the oldest beyond the retention window
    pub fn push_sample(&mut self, sample: ResourceSample) {
        if self.samples.len() >= MAX_SAMPLES_PER_OPERATION {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.touch();
    }

    /// Peak and average memory/CPU across retained samples
    ///
    /// Falls back to the baseline when no sample was ever taken.
    pub fn sample_extremes(&self) -> (u64, u64, f32, f32) {
        if self.samples.is_empty() {
            return (
                self.baseline.memory_bytes,
                self.baseline.memory_bytes,
                self.baseline.cpu_percent,
                self.baseline.cpu_percent,
            );
        }
        let mut peak_memory = 0u64;
        let mut peak_cpu = 0f32;
        let mut memory_sum = 0u128;
        let mut cpu_sum = 0f64;
        for sample in &self.samples {
            peak_memory = peak_memory.max(sample.memory_bytes);
            peak_cpu = peak_cpu.max(sample.cpu_percent);
            memory_sum += u128::from(sample.memory_bytes);
            cpu_sum += f64::from(sample.cpu_percent);
        }
        let count = self.samples.len();
        (
            peak_memory,
            (memory_sum / count as u128) as u64,
            peak_cpu,
            (cpu_sum / count as f64) as f32,
        )
    }

    /// Aggregate the API-call sub-records
    pub fn api_call_stats(&self) -> ApiCallStats {
        let mut stats = ApiCallStats {
            total: self.api_calls.len(),
            ..Default::default()
        };
        let mut duration_sum = 0u64;
        let mut completed = 0usize;
        for call in &self.api_calls {
            match call.success {
                Some(true) => stats.succeeded += 1,
                Some(false) => stats.failed += 1,
                None => {}
            }
            if let Some(duration) = call.duration_ms {
                duration_sum += duration;
                completed += 1;
            }
        }
        if completed > 0 {
            stats.avg_duration_ms = duration_sum as f64 / completed as f64;
        }
        stats
    }

    /// Slowest completed API call, in milliseconds
    pub fn slowest_call_ms(&self) -> Option<u64> {
        self.api_calls.iter().filter_map(|call| call.duration_ms).max()
    }
}
