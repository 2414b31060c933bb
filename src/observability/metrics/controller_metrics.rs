//! # Controller Metrics
//!
//! Metrics for reconciliations, requeues, lifecycle state transitions and Helm operations.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "module_operator_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "module_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "module_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static INSTALL_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "module_operator_install_duration_seconds",
            "Time from PreInstall to a ready release in seconds",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
    )
    .expect("Failed to create INSTALL_DURATION metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "module_operator_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

// Lifecycle metrics
static STATE_TRANSITIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "module_operator_state_transitions_total",
            "Total number of lifecycle state machine transitions",
        ),
        &["work", "state"],
    )
    .expect("Failed to create STATE_TRANSITIONS_TOTAL metric - this should never happen")
});

static TRACKER_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "module_operator_tracker_entries",
        "Current number of in-flight lifecycle tracker entries",
    )
    .expect("Failed to create TRACKER_ENTRIES metric - this should never happen")
});

// Helm metrics
static HELM_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "module_operator_helm_operations_total",
            "Total number of Helm CLI invocations",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create HELM_OPERATIONS_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(INSTALL_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATE_TRANSITIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRACKER_ENTRIES.clone()))?;
    REGISTRY.register(Box::new(HELM_OPERATIONS_TOTAL.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn observe_install_duration(duration: f64) {
    INSTALL_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_state_transitions(work: &str, state: &str) {
    STATE_TRANSITIONS_TOTAL.with_label_values(&[work, state]).inc();
}

pub fn set_tracker_entries(count: usize) {
    TRACKER_ENTRIES.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_helm_operations(operation: &str, result: &str) {
    HELM_OPERATIONS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_reconciliation_errors() {
        let before = RECONCILIATION_ERRORS_TOTAL.get();
        increment_reconciliation_errors();
        let after = RECONCILIATION_ERRORS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before = RECONCILIATION_DURATION.get_sample_count();
        observe_reconciliation_duration(0.25);
        assert!(RECONCILIATION_DURATION.get_sample_count() > before);
    }

    #[test]
    fn test_observe_install_duration() {
        let before = INSTALL_DURATION.get_sample_count();
        observe_install_duration(42.0);
        assert!(INSTALL_DURATION.get_sample_count() > before);
    }

    #[test]
    fn test_labelled_counters() {
        let requeues = REQUEUES_TOTAL.with_label_values(&["test-reason"]);
        let before = requeues.get();
        increment_requeues_total("test-reason");
        assert_eq!(requeues.get(), before + 1);

        let transitions = STATE_TRANSITIONS_TOTAL.with_label_values(&["test-work", "work"]);
        let before = transitions.get();
        increment_state_transitions("test-work", "work");
        assert_eq!(transitions.get(), before + 1);

        let helm = HELM_OPERATIONS_TOTAL.with_label_values(&["test-op", "success"]);
        let before = helm.get();
        increment_helm_operations("test-op", "success");
        assert_eq!(helm.get(), before + 1);
    }

    #[test]
    fn test_register_metrics_once() {
        // The first call may race another test; the second always collides.
        let _ = register_controller_metrics();
        assert!(register_controller_metrics().is_err());
    }
}
