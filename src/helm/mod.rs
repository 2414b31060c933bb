//! # Helm Engine
//!
//! Contract between the lifecycle handlers and the Helm collaborator, plus the
//! production implementation that drives the `helm` binary.
//!
//! ## Sub-modules
//!
//! - `cli` - [`HelmEngine`] backed by the `helm` CLI
//! - `manifest` - workload discovery from a rendered release manifest
//! - `values` - value merging and digests

pub mod cli;
pub mod manifest;
pub mod values;

pub use cli::HelmCli;

use crate::crd::{HelmChart, HelmRepo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors reported by the Helm engine
#[derive(Debug, thiserror::Error)]
pub enum HelmError {
    #[error("Helm release {namespace}/{name} not found")]
    ReleaseNotFound { name: String, namespace: String },
    #[error("helm {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("helm {command} did not finish within {}s", .after.as_secs())]
    TimedOut {
        command: String,
        after: std::time::Duration,
    },
    #[error("Failed to run helm: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse helm output: {0}")]
    Parse(String),
}

/// Status of a Helm release as reported by Helm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    Unknown,
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseStatus {
    /// Parse Helm's status string; unrecognised values map to `Unknown`
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.trim() {
            "deployed" => ReleaseStatus::Deployed,
            "uninstalled" => ReleaseStatus::Uninstalled,
            "superseded" => ReleaseStatus::Superseded,
            "failed" => ReleaseStatus::Failed,
            "uninstalling" => ReleaseStatus::Uninstalling,
            "pending-install" => ReleaseStatus::PendingInstall,
            "pending-upgrade" => ReleaseStatus::PendingUpgrade,
            "pending-rollback" => ReleaseStatus::PendingRollback,
            _ => ReleaseStatus::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Unknown => "unknown",
            ReleaseStatus::Deployed => "deployed",
            ReleaseStatus::Uninstalled => "uninstalled",
            ReleaseStatus::Superseded => "superseded",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Uninstalling => "uninstalling",
            ReleaseStatus::PendingInstall => "pending-install",
            ReleaseStatus::PendingUpgrade => "pending-upgrade",
            ReleaseStatus::PendingRollback => "pending-rollback",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Helm release materialised from a resource for one reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    pub name: String,
    pub namespace: String,
    pub chart: HelmChart,
    pub repository: HelmRepo,
}

/// What Helm reports about an existing release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub status: ReleaseStatus,
    pub chart_version: String,
}

/// Repository basic-auth credentials
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RepoCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RepoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Options for an upgrade-or-install
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    pub release: ReleaseDescriptor,
    pub credentials: Option<RepoCredentials>,
    /// YAML value documents, later documents win
    pub overrides: Vec<String>,
    pub wait: bool,
    pub dry_run: bool,
}

/// Helm collaborator
#[async_trait]
pub trait HelmEngine: Send + Sync {
    /// `helm upgrade --install` the release
    async fn upgrade_or_install(&self, options: &ReleaseOptions) -> Result<ReleaseInfo, HelmError>;

    /// Uninstall the release; a missing release is not an error
    async fn uninstall(&self, name: &str, namespace: &str, dry_run: bool) -> Result<(), HelmError>;

    /// Release metadata, `None` when the release does not exist
    async fn release_info(&self, name: &str, namespace: &str) -> Result<Option<ReleaseInfo>, HelmError>;

    /// User-supplied values of the release
    async fn values(&self, name: &str, namespace: &str) -> Result<serde_json::Value, HelmError>;

    /// Rendered manifest of the release
    async fn manifest(&self, name: &str, namespace: &str) -> Result<String, HelmError>;

    /// Version the chart itself declares
    async fn chart_version(
        &self,
        release: &ReleaseDescriptor,
        credentials: Option<&RepoCredentials>,
    ) -> Result<String, HelmError>;

    async fn is_release_installed(&self, name: &str, namespace: &str) -> Result<bool, HelmError> {
        Ok(self.release_info(name, namespace).await?.is_some())
    }

    async fn is_release_deployed(&self, name: &str, namespace: &str) -> Result<bool, HelmError> {
        Ok(self
            .release_info(name, namespace)
            .await?
            .is_some_and(|info| info.status == ReleaseStatus::Deployed))
    }

    async fn release_status(&self, name: &str, namespace: &str) -> Result<ReleaseStatus, HelmError> {
        self.release_info(name, namespace)
            .await?
            .map(|info| info.status)
            .ok_or_else(|| HelmError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn release_chart_version(&self, name: &str, namespace: &str) -> Result<String, HelmError> {
        self.release_info(name, namespace)
            .await?
            .map(|info| info.chart_version)
            .ok_or_else(|| HelmError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_status_parse() {
        assert_eq!(ReleaseStatus::parse("deployed"), ReleaseStatus::Deployed);
        assert_eq!(
            ReleaseStatus::parse("pending-upgrade"),
            ReleaseStatus::PendingUpgrade
        );
        assert_eq!(ReleaseStatus::parse("unknown"), ReleaseStatus::Unknown);
        assert_eq!(ReleaseStatus::parse("something-new"), ReleaseStatus::Unknown);
        assert_eq!(ReleaseStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_credentials_are_redacted() {
        let credentials = RepoCredentials {
            username: "user".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
