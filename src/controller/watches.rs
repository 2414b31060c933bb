//! # Watch Fan-in
//!
//! Config maps and secrets labelled with `verrazzano.io/module-owner` trigger a
//! reconcile of the Module named by the label, so value-source edits reach the
//! release without a spec change. Only create and update events count; a
//! deleted source leaves its owner alone.

use crate::constants::MODULE_OWNER_LABEL;
use crate::controller::predicates::class_matches;
use crate::crd::Module;
use futures::Stream;
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use tracing::debug;

/// Value sources that were created or changed, with delete events dropped
pub fn applied_sources<S, W>(events: W) -> impl Stream<Item = Result<S, watcher::Error>> + Send
where
    S: Send,
    W: Stream<Item = Result<Event<S>, watcher::Error>> + Send,
{
    events.applied_objects()
}

/// Reconcile requests for the Module owning `source`
///
/// Objects being deleted are ignored. The owner must be known to `owners` and
/// be of `class`.
pub fn owner_requests<S>(source: &S, class: &str, owners: &Store<Module>) -> Option<ObjectRef<Module>>
where
    S: Resource,
{
    if source.meta().deletion_timestamp.is_some() {
        return None;
    }
    let owner = source.labels().get(MODULE_OWNER_LABEL)?;
    let namespace = source.namespace()?;
    let request = ObjectRef::<Module>::new(owner).within(&namespace);

    match owners.get(&request) {
        Some(module) if class_matches(module.as_ref(), class) => {
            debug!(
                source = %source.name_any(),
                module = %owner,
                namespace = %namespace,
                "Value source changed, requeueing owning Module"
            );
            Some(request)
        }
        _ => None,
    }
}
