//! # Action Selection
//!
//! Chooses the lifecycle action for a resource generation by comparing the
//! declared state with what the cluster reports.

use crate::controller::conditions;
use crate::crd::{ConditionReason, LifecycleResource};
use std::cmp::Ordering;
use std::fmt;

/// Lifecycle action driven through the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    Install,
    Update,
    Upgrade,
    Delete,
}

impl LifecycleAction {
    /// Tag used in log messages and metrics
    #[must_use]
    pub fn work_name(self) -> &'static str {
        match self {
            LifecycleAction::Install => "install",
            LifecycleAction::Update => "update",
            LifecycleAction::Upgrade => "upgrade",
            LifecycleAction::Delete => "uninstall",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.work_name())
    }
}

/// Parse a version string as semver, accepting a leading `v`
///
/// # Errors
///
/// Returns the semver error for malformed versions.
pub fn parse_version(version: &str) -> Result<semver::Version, semver::Error> {
    let trimmed = version.trim();
    semver::Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed))
}

/// Compare two version strings as semver
///
/// # Errors
///
/// Returns the semver error when either version is malformed.
pub fn compare_versions(left: &str, right: &str) -> Result<Ordering, semver::Error> {
    Ok(parse_version(left)?.cmp(&parse_version(right)?))
}

/// Choose the action for a declarative resource from its own status
///
/// Without a `Ready` condition, or while the latest one still records an
/// install that has not succeeded, the resource is installed. Otherwise a
/// desired version newer than the last successful one is an upgrade and
/// anything else is an update.
///
/// # Errors
///
/// Returns the semver error when the desired or last successful version is malformed.
pub fn select_declarative_action<K: LifecycleResource>(
    resource: &K,
) -> Result<LifecycleAction, semver::Error> {
    let install_pending = conditions::latest_ready(resource.conditions()).is_none_or(|ready| {
        [
            ConditionReason::PreInstall,
            ConditionReason::InstallStarted,
            ConditionReason::InstallFailed,
        ]
        .iter()
        .any(|reason| ready.reason == reason.as_str())
    });
    if install_pending {
        return Ok(LifecycleAction::Install);
    }

    match resource.last_successful_version() {
        Some(last) if !last.trim().is_empty() && !resource.desired_version().is_empty() => {
            if compare_versions(resource.desired_version(), last)? == Ordering::Greater {
                Ok(LifecycleAction::Upgrade)
            } else {
                Ok(LifecycleAction::Update)
            }
        }
        _ => Ok(LifecycleAction::Update),
    }
}
