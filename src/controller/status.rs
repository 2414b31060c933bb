//! # Status Persistence
//!
//! Read-modify-write of the status subresource and of resource metadata/spec.
//! Conflicts surface as short-delay results so the next pass works from a
//! fresh read.

use crate::cluster::{ClusterError, ResourceStore};
use crate::controller::result::ReconcileResult;
use crate::crd::LifecycleResource;
use kube::ResourceExt;
use tracing::{debug, warn};

fn conflict_or_error(error: ClusterError, what: &str) -> ReconcileResult {
    if error.is_conflict() {
        debug!("Conflict updating {}, requeueing", what);
        ReconcileResult::short_delay()
    } else {
        warn!("Failed to update {}: {}", what, error);
        ReconcileResult::short_delay_with_error(error)
    }
}

/// Persist the status of `local` onto the latest stored copy
///
/// On success `local` is replaced by the stored object so later writes in the
/// same pass carry the new resourceVersion.
pub async fn persist_status<K: LifecycleResource>(
    store: &dyn ResourceStore<K>,
    local: &mut K,
) -> ReconcileResult {
    let namespace = local.namespace_or_default();
    let name = local.name_any();
    let what = format!("status of {} {namespace}/{name}", K::kind(&()));

    let mut latest = match store.get(&namespace, &name).await {
        Ok(Some(latest)) => latest,
        Ok(None) => {
            debug!("{} is gone, skipping status update", what);
            return ReconcileResult::short_delay();
        }
        Err(e) => return conflict_or_error(e, &what),
    };

    if latest.uid() != local.uid() {
        debug!("{} was recreated, skipping status update", what);
        return ReconcileResult::short_delay();
    }

    latest.copy_status_from(local);
    match store.update_status(&latest).await {
        Ok(stored) => {
            *local = stored;
            ReconcileResult::new()
        }
        Err(e) => conflict_or_error(e, &what),
    }
}

/// Persist metadata and spec changes made to `local`
pub async fn persist_resource<K: LifecycleResource>(
    store: &dyn ResourceStore<K>,
    local: &mut K,
) -> ReconcileResult {
    let what = format!(
        "{} {}/{}",
        K::kind(&()),
        local.namespace_or_default(),
        local.name_any()
    );
    match store.update(local).await {
        Ok(stored) => {
            *local = stored;
            ReconcileResult::new()
        }
        Err(e) => conflict_or_error(e, &what),
    }
}
