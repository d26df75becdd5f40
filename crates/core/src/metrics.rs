//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (results, duration, delegated runs)
//! - Items (outcome stages)
//! - Conversions (results, duration)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs finished by result.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("listgrab_jobs_total", "Total jobs finished"),
        &["result"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Job duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("listgrab_job_duration_seconds", "Duration of a job")
            .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &["result"],
    )
    .unwrap()
});

/// Jobs handed to a single delegated yt-dlp process.
pub static DELEGATED_RUNS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "listgrab_delegated_runs_total",
        "Total video playlist downloads delegated to an external process",
    )
    .unwrap()
});

// =============================================================================
// Items
// =============================================================================

/// Item outcomes by stage.
pub static ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("listgrab_items_total", "Total playlist items processed"),
        &["stage"], // "fetched", "skipped_unavailable", "failed"
    )
    .unwrap()
});

// =============================================================================
// Conversions
// =============================================================================

/// Conversions by result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("listgrab_conversions_total", "Total audio conversions"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "listgrab_conversion_duration_seconds",
            "Duration of a single audio conversion",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &[],
    )
    .unwrap()
});

/// Returns every core metric for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(DELEGATED_RUNS.clone()),
        // Items
        Box::new(ITEMS_TOTAL.clone()),
        // Conversions
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
    ]
}
