//! Replica readiness of the workload kinds a Helm release may deploy.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};

/// A Deployment is ready when every desired replica is updated and ready
#[must_use]
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let Some(status) = deployment.status.as_ref() else {
        return desired == 0;
    };
    if let (Some(generation), Some(observed)) =
        (deployment.metadata.generation, status.observed_generation)
    {
        if observed < generation {
            return false;
        }
    }
    status.ready_replicas.unwrap_or(0) >= desired && status.updated_replicas.unwrap_or(0) >= desired
}

#[must_use]
pub fn stateful_set_ready(stateful_set: &StatefulSet) -> bool {
    let desired = stateful_set
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let Some(status) = stateful_set.status.as_ref() else {
        return desired == 0;
    };
    if let (Some(generation), Some(observed)) =
        (stateful_set.metadata.generation, status.observed_generation)
    {
        if observed < generation {
            return false;
        }
    }
    status.ready_replicas.unwrap_or(0) >= desired && status.updated_replicas.unwrap_or(0) >= desired
}

/// A DaemonSet is ready when every scheduled pod is updated and ready
#[must_use]
pub fn daemon_set_ready(daemon_set: &DaemonSet) -> bool {
    let Some(status) = daemon_set.status.as_ref() else {
        return false;
    };
    let desired = status.desired_number_scheduled;
    status.number_ready >= desired && status.updated_number_scheduled.unwrap_or(0) >= desired
}
