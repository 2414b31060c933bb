//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliations, requeues, lifecycle transitions and Helm calls

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
