//! # Observability
//!
//! Prometheus metrics for the operator.

pub mod metrics;
