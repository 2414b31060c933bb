//! # Reconciler Errors
//!
//! Errors handed back to kube-runtime from a reconcile. The error policy turns
//! them into the next [`kube_runtime::controller::Action`].

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    /// A step failed and should be retried after `delay`
    #[error("{message}")]
    Requeue { delay: Duration, message: String },
    /// The object can never be reconciled by this controller as it stands
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl ReconcilerError {
    /// Delay before the next attempt, `None` when retrying cannot help
    #[must_use]
    pub fn requeue_delay(&self) -> Option<Duration> {
        match self {
            ReconcilerError::Requeue { delay, .. } => Some(*delay),
            ReconcilerError::Invariant(_) => None,
        }
    }
}
