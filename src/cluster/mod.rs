//! # Cluster Access
//!
//! Traits over the Kubernetes API used by the reconciler, so the lifecycle can
//! be exercised against in-memory fakes as well as a live cluster.
//!
//! - [`ResourceStore`] - read and write one custom resource kind
//! - [`ClusterReader`] - read value sources and workload readiness
//! - `KubeStore` and `KubeCluster` - implementations backed by a `kube::Client`
//! - `readiness` - replica readiness of Deployments, StatefulSets and DaemonSets

mod kube_client;
pub mod readiness;

pub use kube_client::{KubeCluster, KubeStore};

use crate::helm::manifest::WorkloadRef;
use async_trait::async_trait;

/// Errors returned by cluster access
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Conflict writing {0}")]
    Conflict(String),
    #[error("Kubernetes API error: {0}")]
    Api(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClusterError {
    /// Map a kube error for the named object
    #[must_use]
    pub fn from_kube(error: kube::Error, object: &str) -> Self {
        match error {
            kube::Error::Api(api_err) if api_err.code == 404 => {
                ClusterError::NotFound(object.to_string())
            }
            kube::Error::Api(api_err) if api_err.code == 409 => {
                ClusterError::Conflict(object.to_string())
            }
            kube::Error::SerdeError(e) => ClusterError::Serialization(e.to_string()),
            other => ClusterError::Api(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}

/// Read/write access to one namespaced custom resource kind
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch the object, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError>;

    /// Replace metadata and spec; fails with `Conflict` on a stale resourceVersion
    async fn update(&self, resource: &K) -> Result<K, ClusterError>;

    /// Replace the status subresource; fails with `Conflict` on a stale resourceVersion
    async fn update_status(&self, resource: &K) -> Result<K, ClusterError>;
}

/// Read-only access to the objects a lifecycle depends on
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Value of a config map key; `None` when the map or key is absent
    async fn config_map_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, ClusterError>;

    /// Decoded value of a secret key; `None` when the secret or key is absent
    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, ClusterError>;

    /// Whether the workload has its expected replicas ready; a missing workload is not ready
    async fn workload_ready(&self, workload: &WorkloadRef) -> Result<bool, ClusterError>;
}
