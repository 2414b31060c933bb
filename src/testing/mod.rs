//! In-memory collaborators for exercising the lifecycle without a cluster
//!
//! - [`MemoryStore`] mimics the API server's optimistic concurrency, generation
//!   bumps on spec changes and finalizer-gated deletion
//! - [`MemoryCluster`] serves config maps, secrets and workload readiness
//! - [`FakeHelm`] records releases and the values applied to them
//! - [`Harness`] wires the three into handler contexts and reconcilers

use crate::cluster::{ClusterError, ClusterReader, ResourceStore};
use crate::controller::dispatcher::Reconciler;
use crate::controller::handler::{HandlerContext, HelmClassHooks, Services};
use crate::controller::state_machine::MachineState;
use crate::controller::tracker::{Tracker, TrackerEntry};
use crate::crd::{
    ChartDefaults, HelmChart, HelmRelease, LifecycleResource, Module, ModuleAction,
    ModuleActionSpec, ModuleActionType, ModuleInstaller, ModuleSpec,
};
use crate::helm::manifest::{WorkloadKind, WorkloadRef};
use crate::helm::values::merge_all;
use crate::helm::{
    HelmEngine, HelmError, ReleaseDescriptor, ReleaseInfo, ReleaseOptions, ReleaseStatus,
    RepoCredentials,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const CLASS: &str = "helm";

/// Module in `default` of the test class
pub fn module(name: &str, version: &str) -> Module {
    let mut m = Module::new(
        name,
        ModuleSpec {
            module_name: CLASS.to_string(),
            version: version.to_string(),
            target_namespace: String::new(),
            overrides: Vec::new(),
        },
    );
    m.metadata.namespace = Some("default".to_string());
    m
}

/// ModuleAction in `default` reconciling release `release` at `version`
pub fn module_action(name: &str, release: &str, version: &str) -> ModuleAction {
    let mut action = ModuleAction::new(
        name,
        ModuleActionSpec {
            module_class_name: CLASS.to_string(),
            action: ModuleActionType::Reconcile,
            version: version.to_string(),
            installer: ModuleInstaller {
                helm_release: HelmRelease {
                    name: release.to_string(),
                    chart: HelmChart {
                        name: release.to_string(),
                        version: version.to_string(),
                        path: String::new(),
                    },
                    ..HelmRelease::default()
                },
            },
        },
    );
    action.metadata.namespace = Some("default".to_string());
    action
}

fn spec_of<K: LifecycleResource>(resource: &K) -> Option<serde_json::Value> {
    serde_json::to_value(resource)
        .ok()
        .and_then(|v| v.get("spec").cloned())
}

fn deletion_time() -> Time {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(now)).unwrap()
}

struct StoreState<K> {
    objects: BTreeMap<(String, String), K>,
    revision: u64,
    uids: u64,
}

impl<K> Default for StoreState<K> {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            revision: 0,
            uids: 0,
        }
    }
}

impl<K> StoreState<K> {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

/// Resource store with API-server write semantics
pub struct MemoryStore<K> {
    state: Mutex<StoreState<K>>,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }
}

fn key_of<K: LifecycleResource>(resource: &K) -> (String, String) {
    (resource.namespace_or_default(), resource.name_any())
}

impl<K: LifecycleResource> MemoryStore<K> {
    /// Create the object, assigning uid, resourceVersion and generation 1
    pub fn insert(&self, mut resource: K) -> K {
        let mut state = self.state.lock().unwrap();
        state.uids += 1;
        let uid = format!("uid-{}", state.uids);
        let revision = state.next_revision();
        let meta = resource.meta_mut();
        meta.namespace.get_or_insert_with(|| "default".to_string());
        meta.uid = Some(uid);
        meta.resource_version = Some(revision);
        meta.generation = Some(1);
        state.objects.insert(key_of(&resource), resource.clone());
        resource
    }

    pub fn fetch(&self, namespace: &str, name: &str) -> Option<K> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Edit the stored object as a user would, bumping generation on spec changes
    pub fn modify(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut K)) -> K {
        let mut state = self.state.lock().unwrap();
        let revision = state.next_revision();
        let object = state
            .objects
            .get_mut(&(namespace.to_string(), name.to_string()))
            .unwrap();
        let before = spec_of(object);
        edit(object);
        if spec_of(object) != before {
            object.meta_mut().generation = Some(object.generation_or_zero() + 1);
        }
        object.meta_mut().resource_version = Some(revision);
        object.clone()
    }

    /// Request deletion; objects without finalizers go away at once
    pub fn mark_deleted(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let revision = state.next_revision();
        let Some(object) = state.objects.get_mut(&key) else {
            return;
        };
        if object.finalizers().is_empty() {
            state.objects.remove(&key);
            return;
        }
        object.meta_mut().deletion_timestamp = Some(deletion_time());
        object.meta_mut().resource_version = Some(revision);
    }

    fn current(state: &StoreState<K>, resource: &K) -> Result<K, ClusterError> {
        let key = key_of(resource);
        let existing = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("{}/{}", key.0, key.1)))?;
        if existing.resource_version() != resource.resource_version() {
            return Err(ClusterError::Conflict(format!("{}/{}", key.0, key.1)));
        }
        Ok(existing)
    }
}

#[async_trait]
impl<K: LifecycleResource> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError> {
        Ok(self.fetch(namespace, name))
    }

    async fn update(&self, resource: &K) -> Result<K, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let existing = Self::current(&state, resource)?;

        let mut updated = resource.clone();
        updated.copy_status_from(&existing);
        updated.meta_mut().deletion_timestamp = existing.meta().deletion_timestamp.clone();
        updated.meta_mut().uid = existing.uid();
        let generation = existing.generation_or_zero();
        updated.meta_mut().generation = Some(if spec_of(&updated) == spec_of(&existing) {
            generation
        } else {
            generation + 1
        });
        updated.meta_mut().resource_version = Some(state.next_revision());

        let key = key_of(&updated);
        if updated.is_being_deleted() && updated.finalizers().is_empty() {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, resource: &K) -> Result<K, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let mut updated = Self::current(&state, resource)?;
        updated.copy_status_from(resource);
        updated.meta_mut().resource_version = Some(state.next_revision());
        state.objects.insert(key_of(&updated), updated.clone());
        Ok(updated)
    }
}

type SourceKey = (String, String, String);

/// Config maps, secrets and workload readiness
#[derive(Default)]
pub struct MemoryCluster {
    config_maps: Mutex<HashMap<SourceKey, String>>,
    secrets: Mutex<HashMap<SourceKey, String>>,
    ready: Mutex<HashSet<WorkloadRef>>,
}

fn source_key(namespace: &str, name: &str, key: &str) -> SourceKey {
    (namespace.to_string(), name.to_string(), key.to_string())
}

impl MemoryCluster {
    pub fn put_secret(&self, namespace: &str, name: &str, key: &str, value: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(source_key(namespace, name, key), value.to_string());
    }

    pub fn put_config_map(&self, namespace: &str, name: &str, key: &str, value: &str) {
        self.config_maps
            .lock()
            .unwrap()
            .insert(source_key(namespace, name, key), value.to_string());
    }

    pub fn set_workload_ready(&self, workload: &WorkloadRef, ready: bool) {
        let mut set = self.ready.lock().unwrap();
        if ready {
            set.insert(workload.clone());
        } else {
            set.remove(workload);
        }
    }
}

#[async_trait]
impl ClusterReader for MemoryCluster {
    async fn config_map_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, ClusterError> {
        Ok(self
            .config_maps
            .lock()
            .unwrap()
            .get(&source_key(namespace, name, key))
            .cloned())
    }

    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, ClusterError> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&source_key(namespace, name, key))
            .cloned())
    }

    async fn workload_ready(&self, workload: &WorkloadRef) -> Result<bool, ClusterError> {
        Ok(self.ready.lock().unwrap().contains(workload))
    }
}

struct FakeRelease {
    info: ReleaseInfo,
    overrides: Vec<String>,
}

#[derive(Default)]
struct HelmState {
    releases: BTreeMap<(String, String), FakeRelease>,
    workloads: HashMap<(String, String), Vec<WorkloadRef>>,
    chart_versions: HashMap<String, String>,
    fail_next_query: bool,
    fail_next_apply: Option<String>,
    applies: usize,
    uninstalls: usize,
}

/// Helm engine that deploys instantly
#[derive(Default)]
pub struct FakeHelm {
    state: Mutex<HelmState>,
}

fn release_key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

impl FakeHelm {
    pub fn seed_release(&self, namespace: &str, name: &str, version: &str, status: ReleaseStatus) {
        self.state.lock().unwrap().releases.insert(
            release_key(namespace, name),
            FakeRelease {
                info: ReleaseInfo {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    status,
                    chart_version: version.to_string(),
                },
                overrides: Vec::new(),
            },
        );
    }

    /// Make the next release query fail
    pub fn fail_next_query(&self) {
        self.state.lock().unwrap().fail_next_query = true;
    }

    /// Make the next upgrade-or-install fail with `message`
    pub fn fail_next_apply(&self, message: &str) {
        self.state.lock().unwrap().fail_next_apply = Some(message.to_string());
    }

    /// Version `show chart` reports for the named chart
    pub fn set_chart_version(&self, chart: &str, version: &str) {
        self.state
            .lock()
            .unwrap()
            .chart_versions
            .insert(chart.to_string(), version.to_string());
    }

    /// Workloads rendered into the release manifest
    pub fn set_workloads(&self, namespace: &str, name: &str, workloads: Vec<WorkloadRef>) {
        self.state
            .lock()
            .unwrap()
            .workloads
            .insert(release_key(namespace, name), workloads);
    }

    pub fn release(&self, namespace: &str, name: &str) -> Option<ReleaseInfo> {
        self.state
            .lock()
            .unwrap()
            .releases
            .get(&release_key(namespace, name))
            .map(|r| r.info.clone())
    }

    pub fn has_release(&self, namespace: &str, name: &str) -> bool {
        self.release(namespace, name).is_some()
    }

    /// Merged values last applied to the release
    pub fn release_values(&self, namespace: &str, name: &str) -> Option<serde_json::Value> {
        let state = self.state.lock().unwrap();
        let release = state.releases.get(&release_key(namespace, name))?;
        let documents = release
            .overrides
            .iter()
            .map(|doc| serde_yaml::from_str::<serde_json::Value>(doc).unwrap());
        Some(merge_all(documents))
    }

    pub fn apply_count(&self) -> usize {
        self.state.lock().unwrap().applies
    }

    pub fn uninstall_count(&self) -> usize {
        self.state.lock().unwrap().uninstalls
    }
}

#[async_trait]
impl HelmEngine for FakeHelm {
    async fn upgrade_or_install(&self, options: &ReleaseOptions) -> Result<ReleaseInfo, HelmError> {
        let mut state = self.state.lock().unwrap();
        if let Some(stderr) = state.fail_next_apply.take() {
            return Err(HelmError::CommandFailed {
                command: "upgrade".to_string(),
                stderr,
            });
        }
        state.applies += 1;

        let release = &options.release;
        let chart_version = if release.chart.version.is_empty() {
            state
                .chart_versions
                .get(&release.chart.name)
                .cloned()
                .unwrap_or_default()
        } else {
            release.chart.version.clone()
        };
        let info = ReleaseInfo {
            name: release.name.clone(),
            namespace: release.namespace.clone(),
            status: ReleaseStatus::Deployed,
            chart_version,
        };
        state.releases.insert(
            release_key(&release.namespace, &release.name),
            FakeRelease {
                info: info.clone(),
                overrides: options.overrides.clone(),
            },
        );
        Ok(info)
    }

    async fn uninstall(&self, name: &str, namespace: &str, _dry_run: bool) -> Result<(), HelmError> {
        let mut state = self.state.lock().unwrap();
        state.uninstalls += 1;
        state.releases.remove(&release_key(namespace, name));
        Ok(())
    }

    async fn release_info(&self, name: &str, namespace: &str) -> Result<Option<ReleaseInfo>, HelmError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_query) {
            return Err(HelmError::CommandFailed {
                command: "get metadata".to_string(),
                stderr: "connection refused".to_string(),
            });
        }
        Ok(state
            .releases
            .get(&release_key(namespace, name))
            .map(|r| r.info.clone()))
    }

    async fn values(&self, name: &str, namespace: &str) -> Result<serde_json::Value, HelmError> {
        self.release_values(namespace, name)
            .ok_or_else(|| HelmError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn manifest(&self, name: &str, namespace: &str) -> Result<String, HelmError> {
        let state = self.state.lock().unwrap();
        let workloads = state
            .workloads
            .get(&release_key(namespace, name))
            .cloned()
            .unwrap_or_default();
        Ok(workloads
            .iter()
            .map(|w| {
                format!(
                    "apiVersion: apps/v1\nkind: {}\nmetadata:\n  name: {}\n  namespace: {}\n",
                    w.kind, w.name, w.namespace
                )
            })
            .collect::<Vec<_>>()
            .join("---\n"))
    }

    async fn chart_version(
        &self,
        release: &ReleaseDescriptor,
        _credentials: Option<&RepoCredentials>,
    ) -> Result<String, HelmError> {
        self.state
            .lock()
            .unwrap()
            .chart_versions
            .get(&release.chart.name)
            .cloned()
            .ok_or_else(|| HelmError::CommandFailed {
                command: "show chart".to_string(),
                stderr: format!("chart {} not found", release.chart.name),
            })
    }
}

/// The fakes wired together
pub struct Harness {
    pub modules: Arc<MemoryStore<Module>>,
    pub actions: Arc<MemoryStore<ModuleAction>>,
    pub cluster: Arc<MemoryCluster>,
    pub helm: Arc<FakeHelm>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            modules: Arc::new(MemoryStore::default()),
            actions: Arc::new(MemoryStore::default()),
            cluster: Arc::new(MemoryCluster::default()),
            helm: Arc::new(FakeHelm::default()),
        }
    }

    fn services<K: LifecycleResource>(&self, store: Arc<dyn ResourceStore<K>>) -> Services<K> {
        Services {
            store,
            cluster: Arc::clone(&self.cluster) as Arc<dyn ClusterReader>,
            helm: Arc::clone(&self.helm) as Arc<dyn HelmEngine>,
            hooks: Arc::new(HelmClassHooks::new(CLASS)),
            chart_defaults: ChartDefaults {
                charts_dir: PathBuf::from("/charts"),
                ..ChartDefaults::default()
            },
        }
    }

    /// Context for one pass over `module` with a fresh tracker entry
    pub fn context(&self, module: Module) -> HandlerContext<Module> {
        let services = self.services(Arc::clone(&self.modules) as Arc<dyn ResourceStore<Module>>);
        let entry = Arc::new(TrackerEntry::new(module.generation_or_zero(), MachineState::Init));
        HandlerContext::new(Arc::new(services), module, entry, false)
    }

    /// Module reconciler with its own trackers
    pub fn module_reconciler(&self) -> Reconciler<Module> {
        let services = self.services(Arc::clone(&self.modules) as Arc<dyn ResourceStore<Module>>);
        Reconciler::with_trackers(
            services,
            Arc::new(Tracker::new()),
            Arc::new(Tracker::new()),
            CLASS,
            false,
        )
    }

    /// Module reconciler that rehearses the lifecycle without touching Helm
    pub fn dry_run_module_reconciler(&self) -> Reconciler<Module> {
        let services = self.services(Arc::clone(&self.modules) as Arc<dyn ResourceStore<Module>>);
        Reconciler::with_trackers(
            services,
            Arc::new(Tracker::new()),
            Arc::new(Tracker::new()),
            CLASS,
            true,
        )
    }

    /// ModuleAction reconciler with its own trackers
    pub fn action_reconciler(&self) -> Reconciler<ModuleAction> {
        let services =
            self.services(Arc::clone(&self.actions) as Arc<dyn ResourceStore<ModuleAction>>);
        Reconciler::with_trackers(
            services,
            Arc::new(Tracker::new()),
            Arc::new(Tracker::new()),
            CLASS,
            false,
        )
    }

    /// Module and ModuleAction reconcilers over one pair of trackers, as in
    /// the running operator
    pub fn shared_reconcilers(&self) -> (Reconciler<Module>, Reconciler<ModuleAction>) {
        let tracker = Arc::new(Tracker::new());
        let delete_tracker = Arc::new(Tracker::new());
        let modules = Reconciler::with_trackers(
            self.services(Arc::clone(&self.modules) as Arc<dyn ResourceStore<Module>>),
            Arc::clone(&tracker),
            Arc::clone(&delete_tracker),
            CLASS,
            false,
        );
        let actions = Reconciler::with_trackers(
            self.services(Arc::clone(&self.actions) as Arc<dyn ResourceStore<ModuleAction>>),
            tracker,
            delete_tracker,
            CLASS,
            false,
        );
        (modules, actions)
    }

    /// Render a not-yet-ready Deployment into the release so readiness waits
    pub fn hold_rollout(&self, namespace: &str, release: &str) -> WorkloadRef {
        let workload = WorkloadRef {
            kind: WorkloadKind::Deployment,
            namespace: namespace.to_string(),
            name: format!("{release}-server"),
        };
        self.helm
            .set_workloads(namespace, release, vec![workload.clone()]);
        self.cluster.set_workload_ready(&workload, false);
        workload
    }
}
