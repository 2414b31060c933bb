//! # Module
//!
//! Declarative Module resource: the user's intent for one Helm-backed module.

use crate::crd::helm::ValuesSource;
use crate::crd::status::{Condition, ModuleState};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Module Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: platform.verrazzano.io/v1beta2
/// kind: Module
/// metadata:
///   name: my-module
///   namespace: default
/// spec:
///   moduleName: helm
///   version: 0.1.0
///   targetNamespace: my-module-system
///   overrides:
///     - values:
///         replicas: 2
///     - configMapRef:
///         name: my-module-values
///         key: values.yaml
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Module",
    group = "platform.verrazzano.io",
    version = "v1beta2",
    namespaced,
    status = "ModuleStatus",
    shortname = "vzmod",
    printcolumn = r#"{"name":"Module", "type":"string", "jsonPath":".spec.moduleName"}, {"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Version", "type":"string", "jsonPath":".status.lastSuccessfulVersion"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    /// Module class; selects the controller instance that reconciles this Module
    pub module_name: String,
    /// Desired semver version; empty selects the chart's own version
    #[serde(default)]
    pub version: String,
    /// Namespace the Helm release is installed into; defaults to the Module namespace
    #[serde(default)]
    pub target_namespace: String,
    /// Value overrides, later entries win
    #[serde(default)]
    pub overrides: Vec<ValuesSource>,
}

/// Status of the Module resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    /// Current lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ModuleState>,
    /// Most recent lifecycle conditions, oldest first
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation whose lifecycle last completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Version of the last successful install, upgrade or update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_version: Option<String>,
    /// Generation of the last successful install, upgrade or update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_generation: Option<i64>,
}
