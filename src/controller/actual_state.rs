//! # Actual State
//!
//! Maps what Helm reports about a release onto an abstract module state and
//! decides whether the installed chart is older than the desired one.

use crate::controller::result::ReconcileResult;
use crate::controller::selection::compare_versions;
use crate::helm::{HelmEngine, HelmError, ReleaseDescriptor, ReleaseStatus};
use std::cmp::Ordering;
use std::fmt;
use tracing::error;

/// Module state derived from its Helm release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActualState {
    NotInstalled,
    Ready,
    Reconciling,
    Failed,
    Unknown,
}

impl fmt::Display for ActualState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActualState::NotInstalled => "NotInstalled",
            ActualState::Ready => "Ready",
            ActualState::Reconciling => "Reconciling",
            ActualState::Failed => "Failed",
            ActualState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Map a release status; `None` means the release does not exist
#[must_use]
pub fn actual_state_from(status: Option<ReleaseStatus>) -> ActualState {
    match status {
        None => ActualState::NotInstalled,
        Some(ReleaseStatus::Deployed) => ActualState::Ready,
        Some(ReleaseStatus::Failed) => ActualState::Failed,
        Some(ReleaseStatus::Unknown) => ActualState::Unknown,
        Some(_) => ActualState::Reconciling,
    }
}

/// Query the release and derive its actual state
///
/// Helm errors yield `Unknown` with a requeue carrying the error.
pub async fn get_actual_state(
    helm: &dyn HelmEngine,
    release: &ReleaseDescriptor,
) -> (ActualState, ReconcileResult) {
    match helm.release_status(&release.name, &release.namespace).await {
        Ok(status) => (actual_state_from(Some(status)), ReconcileResult::new()),
        Err(HelmError::ReleaseNotFound { .. }) => (ActualState::NotInstalled, ReconcileResult::new()),
        Err(e) => {
            error!(
                release = %release.name,
                namespace = %release.namespace,
                "Failed to get Helm release status: {}", e
            );
            (ActualState::Unknown, ReconcileResult::short_delay_with_error(e))
        }
    }
}

/// Whether the installed chart version is older than `desired_version`
///
/// A missing release needs no upgrade. Malformed versions yield `false` with a
/// requeue carrying the error.
pub async fn is_upgrade_needed(
    helm: &dyn HelmEngine,
    desired_version: &str,
    release: &ReleaseDescriptor,
) -> (bool, ReconcileResult) {
    let installed = match helm
        .release_chart_version(&release.name, &release.namespace)
        .await
    {
        Ok(version) => version,
        Err(HelmError::ReleaseNotFound { .. }) => return (false, ReconcileResult::new()),
        Err(e) => return (false, ReconcileResult::short_delay_with_error(e)),
    };

    match compare_versions(&installed, desired_version) {
        Ok(ordering) => (ordering == Ordering::Less, ReconcileResult::new()),
        Err(e) => {
            error!(
                installed = %installed,
                desired = %desired_version,
                "Failed to compare chart versions: {}", e
            );
            (
                false,
                ReconcileResult::short_delay_with_error(anyhow::anyhow!(
                    "invalid version (installed '{installed}', desired '{desired_version}'): {e}"
                )),
            )
        }
    }
}
