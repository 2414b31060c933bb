//! # Lifecycle Resources
//!
//! The [`LifecycleResource`] trait is the view of a custom resource that the
//! dispatcher, state machine and handlers work against. Module and ModuleAction
//! both implement it, so a single reconcile path serves both kinds.

use crate::constants;
use crate::crd::helm::{HelmChart, HelmRepo, ValuesSource};
use crate::crd::module::{Module, ModuleStatus};
use crate::crd::module_action::{ModuleAction, ModuleActionStatus, ModuleActionType};
use crate::crd::status::{Condition, ModuleState};
use crate::helm::ReleaseDescriptor;
use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::path::PathBuf;

/// What the resource asks the operator to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedAction {
    /// Converge to the declared spec; the operator picks the action
    Declarative,
    /// Imperative reconcile: install, upgrade or update depending on the release
    Reconcile,
    /// Imperative uninstall
    Delete,
}

/// Chart defaults applied when a resource does not name its chart location
#[derive(Debug, Clone, Default)]
pub struct ChartDefaults {
    /// Directory holding one chart per module class
    pub charts_dir: PathBuf,
    /// Repository used when the resource names none
    pub repo: HelmRepo,
}

/// A custom resource driven through the lifecycle state machine
pub trait LifecycleResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Finalizer owned by the operator on this kind
    const FINALIZER: &'static str;

    /// State recorded once a lifecycle succeeds
    const SUCCESS_STATE: ModuleState;

    /// Module class tag routing the resource to a controller instance
    fn class_name(&self) -> &str;

    fn requested_action(&self) -> RequestedAction;

    /// Desired chart version, empty when unset
    fn desired_version(&self) -> &str;

    fn set_desired_version(&mut self, version: &str);

    fn overrides(&self) -> &[ValuesSource];

    /// Materialise the Helm release descriptor for this reconcile
    fn release_descriptor(&self, defaults: &ChartDefaults) -> ReleaseDescriptor;

    fn state(&self) -> Option<ModuleState>;

    fn set_state(&mut self, state: ModuleState);

    fn conditions(&self) -> &[Condition];

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    fn observed_generation(&self) -> Option<i64>;

    fn set_observed_generation(&mut self, generation: i64);

    /// Version recorded by the last successful lifecycle, when the kind tracks it
    fn last_successful_version(&self) -> Option<&str> {
        None
    }

    /// Record a successful lifecycle, when the kind tracks it
    fn record_success(&mut self, _version: &str, _generation: i64) {}

    /// Replace this object's status with the status of `other`
    fn copy_status_from(&mut self, other: &Self);

    /// Namespace of the resource, `default` when unset
    fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    fn generation_or_zero(&self) -> i64 {
        self.meta().generation.unwrap_or(0)
    }

    fn is_being_deleted(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}

impl LifecycleResource for Module {
    const FINALIZER: &'static str = constants::MODULE_FINALIZER;
    const SUCCESS_STATE: ModuleState = ModuleState::Ready;

    fn class_name(&self) -> &str {
        &self.spec.module_name
    }

    fn requested_action(&self) -> RequestedAction {
        RequestedAction::Declarative
    }

    fn desired_version(&self) -> &str {
        self.spec.version.trim()
    }

    fn set_desired_version(&mut self, version: &str) {
        self.spec.version = version.to_string();
    }

    fn overrides(&self) -> &[ValuesSource] {
        &self.spec.overrides
    }

    fn release_descriptor(&self, defaults: &ChartDefaults) -> ReleaseDescriptor {
        let namespace = if self.spec.target_namespace.trim().is_empty() {
            self.namespace_or_default()
        } else {
            self.spec.target_namespace.trim().to_string()
        };
        ReleaseDescriptor {
            name: self.name_any(),
            namespace,
            chart: HelmChart {
                name: self.spec.module_name.clone(),
                version: self.desired_version().to_string(),
                path: defaults
                    .charts_dir
                    .join(&self.spec.module_name)
                    .to_string_lossy()
                    .into_owned(),
            },
            repository: defaults.repo.clone(),
        }
    }

    fn state(&self) -> Option<ModuleState> {
        self.status.as_ref().and_then(|s| s.state)
    }

    fn set_state(&mut self, state: ModuleState) {
        self.status.get_or_insert_with(ModuleStatus::default).state = Some(state);
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(ModuleStatus::default).conditions
    }

    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.observed_generation)
    }

    fn set_observed_generation(&mut self, generation: i64) {
        self.status
            .get_or_insert_with(ModuleStatus::default)
            .observed_generation = Some(generation);
    }

    fn last_successful_version(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.last_successful_version.as_deref())
    }

    fn record_success(&mut self, version: &str, generation: i64) {
        let status = self.status.get_or_insert_with(ModuleStatus::default);
        status.last_successful_version = Some(version.to_string());
        status.last_successful_generation = Some(generation);
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status.clone_from(&other.status);
    }
}

impl LifecycleResource for ModuleAction {
    const FINALIZER: &'static str = constants::MODULE_ACTION_FINALIZER;
    // One-shot: a successful action is never looked at again.
    const SUCCESS_STATE: ModuleState = ModuleState::Completed;

    fn class_name(&self) -> &str {
        &self.spec.module_class_name
    }

    fn requested_action(&self) -> RequestedAction {
        match self.spec.action {
            ModuleActionType::Reconcile => RequestedAction::Reconcile,
            ModuleActionType::Delete => RequestedAction::Delete,
        }
    }

    fn desired_version(&self) -> &str {
        let version = self.spec.version.trim();
        if version.is_empty() {
            self.spec.installer.helm_release.chart.version.trim()
        } else {
            version
        }
    }

    fn set_desired_version(&mut self, version: &str) {
        self.spec.version = version.to_string();
    }

    fn overrides(&self) -> &[ValuesSource] {
        &self.spec.installer.helm_release.overrides
    }

    fn release_descriptor(&self, defaults: &ChartDefaults) -> ReleaseDescriptor {
        let release = &self.spec.installer.helm_release;
        let namespace = if release.namespace.trim().is_empty() {
            self.namespace_or_default()
        } else {
            release.namespace.trim().to_string()
        };
        let repository = if release.repo.uri.trim().is_empty() && release.chart.path.is_empty() {
            defaults.repo.clone()
        } else {
            release.repo.clone()
        };
        ReleaseDescriptor {
            name: release.name.clone(),
            namespace,
            chart: HelmChart {
                name: release.chart.name.clone(),
                version: self.desired_version().to_string(),
                path: release.chart.path.clone(),
            },
            repository,
        }
    }

    fn state(&self) -> Option<ModuleState> {
        self.status.as_ref().and_then(|s| s.state)
    }

    fn set_state(&mut self, state: ModuleState) {
        self.status
            .get_or_insert_with(ModuleActionStatus::default)
            .state = Some(state);
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self
            .status
            .get_or_insert_with(ModuleActionStatus::default)
            .conditions
    }

    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.observed_generation)
    }

    fn set_observed_generation(&mut self, generation: i64) {
        self.status
            .get_or_insert_with(ModuleActionStatus::default)
            .observed_generation = Some(generation);
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status.clone_from(&other.status);
    }
}
