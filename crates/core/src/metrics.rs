//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Batches (runs, direct copies, cancellations)
//! - Conversions (per-backend results, fallthroughs, durations)
//! - External tool processes

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// =============================================================================
// Batch Metrics
// =============================================================================

/// Finished batches by result.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_batches_total", "Total batches run to completion"),
        &["result"], // "completed", "cancelled"
    )
    .unwrap()
});

/// Wall-clock duration of a batch.
pub static BATCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("convertino_batch_duration_seconds", "Duration of a whole batch")
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["result"],
    )
    .unwrap()
});

/// Tasks satisfied by copying the source instead of converting.
pub static DIRECT_COPIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_direct_copies_total",
        "Total tasks completed by a plain file copy",
    )
    .unwrap()
});

/// Times a queue was cancelled.
pub static CANCELLATIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("convertino_cancellations_total", "Total queue cancellations").unwrap()
});

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Backend attempts by backend and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_conversions_total", "Total backend conversion attempts"),
        &["backend", "result"], // result: "success", "failed", "cancelled"
    )
    .unwrap()
});

/// Failed backend attempts that moved on to the next backend in the plan.
pub static BACKEND_FALLTHROUGHS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_backend_fallthroughs_total",
        "Total backend failures that fell through to the next backend",
    )
    .unwrap()
});

/// Successful conversion duration by output format.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertino_conversion_duration_seconds",
            "Duration of successful conversions",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["format"],
    )
    .unwrap()
});

// =============================================================================
// Process Metrics
// =============================================================================

pub static PROCESSES_SPAWNED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_processes_spawned_total",
        "Total external tool processes spawned",
    )
    .unwrap()
});

pub static PROCESSES_KILLED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_processes_killed_total",
        "Total external tool processes terminated before exiting",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Batches
        Box::new(BATCHES_TOTAL.clone()),
        Box::new(BATCH_DURATION.clone()),
        Box::new(DIRECT_COPIES.clone()),
        Box::new(CANCELLATIONS.clone()),
        // Conversions
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(BACKEND_FALLTHROUGHS.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        // Processes
        Box::new(PROCESSES_SPAWNED.clone()),
        Box::new(PROCESSES_KILLED.clone()),
    ]
}

/// Registers every core metric with `registry`.
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    Ok(())
}

/// Encodes everything in `registry` as Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> prometheus::Result<String> {
    let mut buffer = String::new();
    TextEncoder::new().encode_utf8(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_once_per_registry() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        assert!(register_metrics(&registry).is_err());
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        DIRECT_COPIES.inc();
        CONVERSIONS_TOTAL.with_label_values(&["raster", "success"]).inc();

        let output = encode_metrics(&registry).unwrap();
        assert!(output.contains("# TYPE convertino_direct_copies_total counter"));
        assert!(output.contains("convertino_conversions_total{backend=\"raster\",result=\"success\"}"));
    }
}
