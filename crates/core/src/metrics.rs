//! Prometheus metrics for the queue engine.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

/// Jobs enqueued total.
pub static JOBS_ENQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("medley_jobs_enqueued_total", "Total jobs enqueued").unwrap()
});

/// Jobs finished total by terminal state.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("medley_jobs_finished_total", "Total jobs reaching a terminal state"),
        &["state"], // "succeeded", "failed", "cancelled"
    )
    .unwrap()
});

/// Retry attempts scheduled total.
pub static RETRIES_SCHEDULED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "medley_retries_scheduled_total",
        "Total retries scheduled by the backoff policy",
    )
    .unwrap()
});

/// Fetch duration in seconds.
pub static FETCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("medley_fetch_duration_seconds", "Duration of fetches").buckets(vec![
            0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
        ]),
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "medley_conversion_duration_seconds",
            "Duration of conversions",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .unwrap()
});

/// Get all engine metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_ENQUEUED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(RETRIES_SCHEDULED.clone()),
        Box::new(FETCH_DURATION.clone()),
        Box::new(CONVERSION_DURATION.clone()),
    ]
}
