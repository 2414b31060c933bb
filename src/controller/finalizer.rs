//! # Finalizer Engine
//!
//! Keeps the kind's finalizer on live resources and removes it once the
//! deletion machine has finished.

use crate::cluster::ResourceStore;
use crate::controller::result::ReconcileResult;
use crate::controller::status;
use crate::crd::LifecycleResource;
use kube::ResourceExt;
use tracing::{debug, info};

#[must_use]
pub fn has_finalizer<K: LifecycleResource>(resource: &K) -> bool {
    resource.finalizers().iter().any(|f| f == K::FINALIZER)
}

/// Add the finalizer locally, returning whether anything changed
pub fn add_local<K: LifecycleResource>(resource: &mut K) -> bool {
    if has_finalizer(resource) {
        return false;
    }
    resource.finalizers_mut().push(K::FINALIZER.to_string());
    true
}

/// Remove every copy of the finalizer locally, returning whether anything changed
pub fn remove_local<K: LifecycleResource>(resource: &mut K) -> bool {
    let before = resource.finalizers().len();
    resource.finalizers_mut().retain(|f| f != K::FINALIZER);
    resource.finalizers().len() != before
}

/// Make sure the finalizer is committed on the resource
///
/// Returns `None` when it already was. Otherwise the finalizer is persisted and
/// a short-delay result returned so the next pass sees the committed object.
pub async fn ensure_finalizer<K: LifecycleResource>(
    store: &dyn ResourceStore<K>,
    resource: &mut K,
) -> Option<ReconcileResult> {
    if !add_local(resource) {
        return None;
    }
    info!(finalizer = K::FINALIZER, "Adding finalizer");
    let result = status::persist_resource(store, resource).await;
    if result.should_requeue() {
        return Some(result);
    }
    Some(ReconcileResult::short_delay())
}

/// Drop the finalizer so the API server can remove the resource
pub async fn remove_finalizer<K: LifecycleResource>(
    store: &dyn ResourceStore<K>,
    resource: &mut K,
) -> ReconcileResult {
    if !remove_local(resource) {
        debug!(finalizer = K::FINALIZER, "Finalizer already removed");
        return ReconcileResult::new();
    }
    info!(finalizer = K::FINALIZER, "Removing finalizer");
    status::persist_resource(store, resource).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Module, ModuleAction};
    use crate::testing::{module, MemoryStore};

    #[test]
    fn test_local_edits_are_idempotent() {
        let mut m = module("m", "0.1.0");
        assert!(add_local(&mut m));
        assert!(!add_local(&mut m));
        assert_eq!(m.finalizers(), &[Module::FINALIZER.to_string()]);

        m.finalizers_mut().push(Module::FINALIZER.to_string());
        assert!(remove_local(&mut m));
        assert!(!has_finalizer(&m));
        assert!(!remove_local(&mut m));
    }

    #[test]
    fn test_kinds_use_distinct_finalizers() {
        assert_ne!(Module::FINALIZER, ModuleAction::FINALIZER);
    }

    #[tokio::test]
    async fn test_two_passes_converge_to_one_finalizer() {
        let store = MemoryStore::<Module>::default();
        let mut m = store.insert(module("m", "0.1.0"));

        let first = ensure_finalizer(&store, &mut m).await;
        assert!(first.is_some_and(|r| r.should_requeue() && !r.is_error()));

        let mut reread = store.fetch("default", "m").unwrap();
        assert!(ensure_finalizer(&store, &mut reread).await.is_none());
        assert_eq!(
            store.fetch("default", "m").unwrap().finalizers(),
            &[Module::FINALIZER.to_string()]
        );
    }
}
