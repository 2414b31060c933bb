//! # Tracker Store
//!
//! Process-wide record of where each resource generation is in the lifecycle
//! state machine. Entries are keyed by `kind/namespace/name/uid/gen-N`; at most
//! one entry is kept per (kind, namespace, name, uid), always the highest
//! generation seen. Modules and ModuleActions share the store, so every lookup
//! and purge is scoped to one kind.
//!
//! The store itself is guarded by a read/write lock. Entry fields are mutated
//! outside the store lock: kube-runtime never reconciles the same object on two
//! workers at once, so each entry has a single writer.

use crate::controller::selection::LifecycleAction;
use crate::controller::state_machine::MachineState;
use crate::crd::LifecycleResource;
use crate::observability;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;

static GLOBAL_TRACKER: LazyLock<Arc<Tracker>> = LazyLock::new(|| Arc::new(Tracker::new()));

static GLOBAL_DELETE_TRACKER: LazyLock<Arc<Tracker>> =
    LazyLock::new(|| Arc::new(Tracker::new()));

/// Progress of one resource generation
#[derive(Debug)]
pub struct TrackerEntry {
    generation: i64,
    state: Mutex<MachineState>,
    pre_install_timestamp: Mutex<Option<DateTime<Utc>>>,
    action: Mutex<Option<LifecycleAction>>,
    values_digest: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TrackerEntry {
    #[must_use]
    pub fn new(generation: i64, state: MachineState) -> Self {
        Self {
            generation,
            state: Mutex::new(state),
            pre_install_timestamp: Mutex::new(None),
            action: Mutex::new(None),
            values_digest: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn generation(&self) -> i64 {
        self.generation
    }

    #[must_use]
    pub fn state(&self) -> MachineState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: MachineState) {
        *lock(&self.state) = state;
    }

    /// When the pre-install phase first ran for this generation
    #[must_use]
    pub fn pre_install_timestamp(&self) -> Option<DateTime<Utc>> {
        *lock(&self.pre_install_timestamp)
    }

    pub fn mark_pre_install(&self) {
        lock(&self.pre_install_timestamp).get_or_insert_with(Utc::now);
    }

    /// Action chosen for this generation, if one has been pinned
    #[must_use]
    pub fn pinned_action(&self) -> Option<LifecycleAction> {
        *lock(&self.action)
    }

    pub fn pin_action(&self, action: LifecycleAction) {
        *lock(&self.action) = Some(action);
    }

    /// Digest of the override values last applied for this generation
    #[must_use]
    pub fn values_digest(&self) -> Option<String> {
        lock(&self.values_digest).clone()
    }

    pub fn set_values_digest(&self, digest: String) {
        *lock(&self.values_digest) = Some(digest);
    }

    /// Restart the machine for the same generation
    pub fn rearm(&self) {
        self.set_state(MachineState::Init);
    }
}

/// Map of tracker entries keyed by resource generation
#[derive(Debug, Default)]
pub struct Tracker {
    entries: RwLock<HashMap<String, Arc<TrackerEntry>>>,
}

/// Compose the tracker key for one generation
#[must_use]
pub fn tracker_key(kind: &str, namespace: &str, name: &str, uid: &str, generation: i64) -> String {
    format!("{kind}/{namespace}/{name}/{uid}/gen-{generation}")
}

fn object_prefix(kind: &str, namespace: &str, name: &str, uid: &str) -> String {
    format!("{kind}/{namespace}/{name}/{uid}/")
}

impl Tracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker shared by every lifecycle controller in the process
    #[must_use]
    pub fn global() -> Arc<Tracker> {
        Arc::clone(&GLOBAL_TRACKER)
    }

    /// Tracker shared by every deletion machine in the process
    #[must_use]
    pub fn global_delete() -> Arc<Tracker> {
        Arc::clone(&GLOBAL_DELETE_TRACKER)
    }

    /// Get the entry for the resource's current generation, creating it if needed
    ///
    /// Creating an entry drops every older generation of the same object.
    pub fn ensure<K: LifecycleResource>(&self, resource: &K, initial: MachineState) -> Arc<TrackerEntry> {
        let namespace = resource.namespace_or_default();
        let name = resource.name_any();
        let uid = resource.uid().unwrap_or_default();
        self.ensure_key(
            &K::kind(&()),
            &namespace,
            &name,
            &uid,
            resource.generation_or_zero(),
            initial,
        )
    }

    pub fn ensure_key(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        uid: &str,
        generation: i64,
        initial: MachineState,
    ) -> Arc<TrackerEntry> {
        let key = tracker_key(kind, namespace, name, uid, generation);
        let prefix = object_prefix(kind, namespace, name, uid);
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get(&key) {
            return Arc::clone(entry);
        }

        let newer_exists = entries
            .iter()
            .any(|(k, e)| k.starts_with(&prefix) && e.generation > generation);
        if newer_exists {
            // Stale cache read; hand out a detached entry so the newer one survives
            debug!(key = %key, "Newer generation already tracked, using detached entry");
            return Arc::new(TrackerEntry::new(generation, initial));
        }

        entries.retain(|k, _| !k.starts_with(&prefix));
        let entry = Arc::new(TrackerEntry::new(generation, initial));
        entries.insert(key, Arc::clone(&entry));
        observability::metrics::set_tracker_entries(entries.len());
        entry
    }

    /// Remove every entry of the object identified by (namespace, name, uid)
    pub fn delete<K: LifecycleResource>(&self, resource: &K) {
        let namespace = resource.namespace_or_default();
        let name = resource.name_any();
        let uid = resource.uid().unwrap_or_default();
        self.delete_prefix(&object_prefix(&K::kind(&()), &namespace, &name, &uid));
    }

    /// Remove every entry of `kind` named (namespace, name), whatever its uid
    ///
    /// Used when the object is gone and its uid is no longer known.
    pub fn delete_named(&self, kind: &str, namespace: &str, name: &str) {
        self.delete_prefix(&format!("{kind}/{namespace}/{name}/"));
    }

    fn delete_prefix(&self, prefix: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|k, _| !k.starts_with(prefix));
        observability::metrics::set_tracker_entries(entries.len());
    }

    /// Look up an entry without creating it
    #[must_use]
    pub fn get(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        uid: &str,
        generation: i64,
    ) -> Option<Arc<TrackerEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tracker_key(kind, namespace, name, uid, generation))
            .map(Arc::clone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of every tracked generation, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}
