//! # Error Policy
//!
//! Turns reconcile errors into the controller's next action.

use crate::constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS;
use crate::controller::{Reconciler, ReconcilerError};
use crate::crd::LifecycleResource;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Delay before retrying after `error`; a failure that carries no delay of
/// its own waits the default error requeue
fn retry_delay(error: &ReconcilerError) -> Option<Duration> {
    error.requeue_delay().map(|delay| {
        if delay.is_zero() {
            Duration::from_secs(DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS)
        } else {
            delay
        }
    })
}

/// Handle a reconcile error for `obj`
///
/// `Requeue` errors retry after the delay they carry, or after
/// [`DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS`] when that delay is zero.
/// `Invariant` errors wait
/// for the object to change, since retrying the same object cannot succeed.
pub fn handle_reconciliation_error<K: LifecycleResource>(
    obj: Arc<K>,
    error: &ReconcilerError,
    _ctx: Arc<Reconciler<K>>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    observability::metrics::increment_reconciliation_errors();

    match retry_delay(error) {
        Some(delay) => {
            error!(
                resource.kind = %K::kind(&()),
                resource.namespace = %namespace,
                resource.name = %name,
                "Reconciliation error, retrying in {}ms: {}",
                delay.as_millis(),
                error
            );
            observability::metrics::increment_requeues_total("error");
            Action::requeue(delay)
        }
        None => {
            warn!(
                resource.kind = %K::kind(&()),
                resource.namespace = %namespace,
                resource.name = %name,
                "Not retrying until the resource changes: {}",
                error
            );
            Action::await_change()
        }
    }
}
