// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Structured telemetry for integration runs (§4.9, §9 ambient concerns).
//!
//! This crate is independent of [`ih_run_tracker`]: the tracker persists
//! the authoritative per-run/per-test record used for reporting and trend
//! analysis, while this crate aggregates lightweight operational metrics
//! (pass rate, duration distribution, retry counts) across runs for anyone
//! scraping or archiving them separately.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;

// ---------------------------------------------------------------------------
// RunMetrics
// ---------------------------------------------------------------------------

/// Metrics captured for a single completed [`ih_core::Run`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunMetrics {
    /// The run's identifier, e.g. `run-2026-07-27-001`.
    pub run_id: String,
    /// Selection descriptor rendered as a short label (suite/id/group/all).
    pub selection: String,
    /// Wall-clock duration of the whole run in milliseconds.
    pub duration_ms: u64,
    /// Total specs selected for the run.
    pub total_count: usize,
    /// Specs whose every check passed (and whose semantic judge, if run, agreed).
    pub passed_count: usize,
    /// Specs with at least one failed check.
    pub failed_count: usize,
    /// Specs skipped (missing fixture, explicit skip reason, or cancelled).
    pub skipped_count: usize,
    /// Specs that carried a semantic sub-spec.
    pub semantic_required: usize,
    /// Specs whose semantic judge actually returned a non-unavailable verdict.
    pub semantic_completed: usize,
    /// Backend retry attempts observed across the run (rate-limit backoffs).
    pub backend_retries: u64,
}

// ---------------------------------------------------------------------------
// MetricsSummary
// ---------------------------------------------------------------------------

/// Aggregated statistics across multiple recorded runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    /// Number of runs recorded.
    pub count: usize,
    /// Mean run duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Median (p50) run duration in milliseconds.
    pub p50_duration_ms: f64,
    /// 99th-percentile run duration in milliseconds.
    pub p99_duration_ms: f64,
    /// Total specs passed across all recorded runs.
    pub total_passed: u64,
    /// Total specs failed across all recorded runs.
    pub total_failed: u64,
    /// Mean pass rate (passed / total) across all recorded runs.
    pub mean_pass_rate: f64,
    /// Per-selection-label run counts (deterministic ordering).
    pub selection_counts: BTreeMap<String, usize>,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            count: 0,
            mean_duration_ms: 0.0,
            p50_duration_ms: 0.0,
            p99_duration_ms: 0.0,
            total_passed: 0,
            total_failed: 0,
            mean_pass_rate: 0.0,
            selection_counts: BTreeMap::new(),
        }
    }
}

/// Compute a percentile value from a **sorted** slice.
fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] as f64 * (1.0 - frac) + sorted[upper] as f64 * frac
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Thread-safe collector for run metrics.
///
/// Wrap in an `Arc` to share across tasks (the inner storage is already
/// behind a `Mutex`); a fresh collector is typically created per CLI
/// invocation and its summary written alongside the run's Markdown report.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<RunMetrics>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record a completed run's metrics.
    pub fn record(&self, metrics: RunMetrics) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.push(metrics);
    }

    /// Return all recorded run metrics.
    pub fn runs(&self) -> Vec<RunMetrics> {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.clone()
    }

    /// Number of runs recorded so far.
    pub fn len(&self) -> usize {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.len()
    }

    /// Whether the collector has no recorded runs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute an aggregated summary of all recorded runs.
    pub fn summary(&self) -> MetricsSummary {
        let data = self.inner.lock().expect("metrics lock poisoned");
        if data.is_empty() {
            return MetricsSummary::default();
        }

        let count = data.len();
        let mut durations: Vec<u64> = data.iter().map(|r| r.duration_ms).collect();
        durations.sort_unstable();

        let total_duration: u64 = durations.iter().sum();
        let mean_duration_ms = total_duration as f64 / count as f64;
        let p50_duration_ms = percentile(&durations, 50.0);
        let p99_duration_ms = percentile(&durations, 99.0);

        let total_passed: u64 = data.iter().map(|r| r.passed_count as u64).sum();
        let total_failed: u64 = data.iter().map(|r| r.failed_count as u64).sum();

        let mean_pass_rate = data
            .iter()
            .map(|r| {
                if r.total_count == 0 {
                    0.0
                } else {
                    r.passed_count as f64 / r.total_count as f64
                }
            })
            .sum::<f64>()
            / count as f64;

        let mut selection_counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in data.iter() {
            *selection_counts.entry(r.selection.clone()).or_insert(0) += 1;
        }

        MetricsSummary {
            count,
            mean_duration_ms,
            p50_duration_ms,
            p99_duration_ms,
            total_passed,
            total_failed,
            mean_pass_rate,
            selection_counts,
        }
    }

    /// Clear all recorded metrics.
    pub fn clear(&self) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.clear();
    }
}

// ---------------------------------------------------------------------------
// TelemetrySpan
// ---------------------------------------------------------------------------

/// A structured span for tracing integration, e.g. one per spec execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySpan {
    /// Span name / operation, e.g. `run_one_spec`.
    pub name: String,
    /// Arbitrary key-value attributes (deterministic ordering).
    pub attributes: BTreeMap<String, String>,
}

impl TelemetrySpan {
    /// Create a new span with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Insert an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Emit the span via `tracing::info!`.
    pub fn emit(&self) {
        info!(
            span_name = %self.name,
            attributes = ?self.attributes,
            "telemetry_span"
        );
    }
}

// ---------------------------------------------------------------------------
// TelemetryExporter
// ---------------------------------------------------------------------------

/// Trait for exporting collected metrics.
pub trait TelemetryExporter: Send + Sync {
    /// Export the given summary. Returns the serialized output on success.
    fn export(&self, summary: &MetricsSummary) -> Result<String, String>;
}

/// Exports metrics as pretty-printed JSON to a string.
#[derive(Debug, Default)]
pub struct JsonExporter;

impl TelemetryExporter for JsonExporter {
    fn export(&self, summary: &MetricsSummary) -> Result<String, String> {
        serde_json::to_string_pretty(summary).map_err(|e| e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
