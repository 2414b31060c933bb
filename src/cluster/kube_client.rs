//! Cluster access backed by a live `kube::Client`.

use crate::cluster::readiness;
use crate::cluster::{ClusterError, ClusterReader, ResourceStore};
use crate::constants;
use crate::crd::LifecycleResource;
use crate::helm::manifest::{WorkloadKind, WorkloadRef};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::fmt;
use std::marker::PhantomData;

/// [`ResourceStore`] for one custom resource kind
pub struct KubeStore<K> {
    client: Client,
    kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for KubeStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

fn object_ref<K: LifecycleResource>(resource: &K) -> String {
    format!(
        "{} {}/{}",
        K::kind(&()),
        resource.namespace_or_default(),
        resource.name_any()
    )
}

#[async_trait]
impl<K: LifecycleResource> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("{} {namespace}/{name}", K::kind(&()))))
    }

    async fn update(&self, resource: &K) -> Result<K, ClusterError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &resource.namespace_or_default());
        api.replace(&resource.name_any(), &PostParams::default(), resource)
            .await
            .map_err(|e| ClusterError::from_kube(e, &object_ref(resource)))
    }

    async fn update_status(&self, resource: &K) -> Result<K, ClusterError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &resource.namespace_or_default());
        let serialized =
            serde_json::to_value(resource).map_err(|e| ClusterError::Serialization(e.to_string()))?;
        let status = serialized
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        // resourceVersion makes the API server reject writes based on a stale read
        let patch = json!({
            "metadata": { "resourceVersion": resource.resource_version() },
            "status": status,
        });
        api.patch_status(
            &resource.name_any(),
            &PatchParams::apply(constants::FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| ClusterError::from_kube(e, &object_ref(resource)))
    }
}

/// [`ClusterReader`] over config maps, secrets and apps/v1 workloads
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

#[async_trait]
impl ClusterReader for KubeCluster {
    async fn config_map_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, ClusterError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let config_map = api
            .get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("ConfigMap {namespace}/{name}")))?;
        Ok(config_map.and_then(|cm| cm.data.and_then(|mut data| data.remove(key))))
    }

    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api
            .get_opt(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("Secret {namespace}/{name}")))?
        else {
            return Ok(None);
        };

        if let Some(bytes) = secret.data.as_ref().and_then(|data| data.get(key)) {
            let value = String::from_utf8(bytes.0.clone()).map_err(|e| {
                ClusterError::Serialization(format!(
                    "Secret {namespace}/{name} key {key} is not UTF-8: {e}"
                ))
            })?;
            return Ok(Some(value));
        }
        Ok(secret.string_data.and_then(|mut data| data.remove(key)))
    }

    async fn workload_ready(&self, workload: &WorkloadRef) -> Result<bool, ClusterError> {
        let object = workload.to_string();
        let ready = match workload.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &workload.namespace);
                api.get_opt(&workload.name)
                    .await
                    .map_err(|e| ClusterError::from_kube(e, &object))?
                    .is_some_and(|d| readiness::deployment_ready(&d))
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> =
                    Api::namespaced(self.client.clone(), &workload.namespace);
                api.get_opt(&workload.name)
                    .await
                    .map_err(|e| ClusterError::from_kube(e, &object))?
                    .is_some_and(|s| readiness::stateful_set_ready(&s))
            }
            WorkloadKind::DaemonSet => {
                let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), &workload.namespace);
                api.get_opt(&workload.name)
                    .await
                    .map_err(|e| ClusterError::from_kube(e, &object))?
                    .is_some_and(|d| readiness::daemon_set_ready(&d))
            }
        };
        Ok(ready)
    }
}
