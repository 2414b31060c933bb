//! # ModuleAction
//!
//! Imperative, one-shot request to reconcile or delete a Helm-backed module.

use crate::crd::helm::HelmRelease;
use crate::crd::status::{Condition, ModuleState};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ModuleAction Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: platform.verrazzano.io/v1alpha1
/// kind: ModuleAction
/// metadata:
///   name: install-my-module
///   namespace: default
/// spec:
///   moduleClassName: helm
///   action: reconcile
///   version: 0.1.0
///   installer:
///     helmRelease:
///       name: my-module
///       namespace: my-module-system
///       chart:
///         name: my-module
///         version: 0.1.0
///       repo:
///         name: stable
///         uri: https://charts.example.com
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ModuleAction",
    group = "platform.verrazzano.io",
    version = "v1alpha1",
    namespaced,
    status = "ModuleActionStatus",
    shortname = "vzmodaction",
    printcolumn = r#"{"name":"Action", "type":"string", "jsonPath":".spec.action"}, {"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ModuleActionSpec {
    /// Module class; selects the controller instance that handles this action
    pub module_class_name: String,
    /// Requested action
    #[serde(default)]
    pub action: ModuleActionType,
    /// Desired semver version; empty selects the chart's own version
    #[serde(default)]
    pub version: String,
    /// How the module is installed
    pub installer: ModuleInstaller,
}

/// Actions a ModuleAction may request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ModuleActionType {
    /// Converge the release to the requested chart and values
    #[default]
    Reconcile,
    /// Uninstall the release
    Delete,
}

impl fmt::Display for ModuleActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleActionType::Reconcile => f.write_str("reconcile"),
            ModuleActionType::Delete => f.write_str("delete"),
        }
    }
}

/// Installer section of a ModuleAction
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInstaller {
    /// Helm release to manage
    pub helm_release: HelmRelease,
}

/// Status of the ModuleAction resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleActionStatus {
    /// Current lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ModuleState>,
    /// Most recent lifecycle conditions, oldest first
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation whose lifecycle last completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
