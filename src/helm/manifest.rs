//! # Release Manifest
//!
//! Workload discovery from the rendered manifest of a Helm release.

use crate::helm::HelmError;
use serde::Deserialize;
use std::fmt;

/// Workload kinds whose readiness gates a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    fn from_kind(api_version: &str, kind: &str) -> Option<Self> {
        if api_version != "apps/v1" {
            return None;
        }
        match kind {
            "Deployment" => Some(WorkloadKind::Deployment),
            "StatefulSet" => Some(WorkloadKind::StatefulSet),
            "DaemonSet" => Some(WorkloadKind::DaemonSet),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::Deployment => f.write_str("Deployment"),
            WorkloadKind::StatefulSet => f.write_str("StatefulSet"),
            WorkloadKind::DaemonSet => f.write_str("DaemonSet"),
        }
    }
}

/// One workload deployed by a release
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectHeader {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: ObjectMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

/// Collect the Deployments, StatefulSets and DaemonSets in a manifest
///
/// Objects without a namespace are assumed to live in `release_namespace`.
///
/// # Errors
///
/// Returns [`HelmError::Parse`] when a document is not valid YAML.
pub fn workloads(manifest: &str, release_namespace: &str) -> Result<Vec<WorkloadRef>, HelmError> {
    let mut found = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| HelmError::Parse(e.to_string()))?;
        if !value.is_mapping() {
            continue;
        }
        let header: ObjectHeader =
            serde_yaml::from_value(value).map_err(|e| HelmError::Parse(e.to_string()))?;
        let Some(kind) = WorkloadKind::from_kind(&header.api_version, &header.kind) else {
            continue;
        };
        if header.metadata.name.is_empty() {
            continue;
        }
        found.push(WorkloadRef {
            kind,
            namespace: header
                .metadata
                .namespace
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| release_namespace.to_string()),
            name: header.metadata.name,
        });
    }
    Ok(found)
}
