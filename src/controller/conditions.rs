//! # Condition Engine
//!
//! Bookkeeping for the `Ready` condition history kept in a lifecycle status:
//! timestamping, de-duplication, the length cap, message templates and the
//! reason to state mapping.

use crate::constants;
use crate::crd::{Condition, ConditionReason, LifecycleResource, ModuleState};
use chrono::{SecondsFormat, Utc};

/// Current time as ISO-8601, second precision, UTC
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build a `Ready` condition for the reason, stamped now
#[must_use]
pub fn ready_condition(reason: ConditionReason, message: String) -> Condition {
    Condition {
        r#type: constants::CONDITION_TYPE_READY.to_string(),
        reason: reason.as_str().to_string(),
        status: reason.status(),
        message,
        last_transition_time: Some(now_timestamp()),
    }
}

/// Append a condition to the list
///
/// Returns `false` and leaves the list untouched when the latest condition of the
/// same type already records the same reason, status and message. Otherwise any
/// earlier entry with the same type and reason is dropped, the condition is
/// appended and the oldest entries are trimmed to the cap.
pub fn append_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    let latest_same_type = conditions
        .iter()
        .rev()
        .find(|c| c.r#type == condition.r#type);
    if latest_same_type.is_some_and(|latest| latest.same_observation(&condition)) {
        return false;
    }

    conditions.retain(|c| !(c.r#type == condition.r#type && c.reason == condition.reason));
    conditions.push(condition);
    if conditions.len() > constants::CONDITION_ARRAY_LIMIT {
        let excess = conditions.len() - constants::CONDITION_ARRAY_LIMIT;
        conditions.drain(..excess);
    }
    true
}

/// Latest `Ready` condition, if any
#[must_use]
pub fn latest_ready(conditions: &[Condition]) -> Option<&Condition> {
    conditions
        .iter()
        .rev()
        .find(|c| c.r#type == constants::CONDITION_TYPE_READY)
}

/// Lifecycle state implied by a condition reason
#[must_use]
pub fn state_for_reason(reason: ConditionReason, success_state: ModuleState) -> ModuleState {
    match reason {
        ConditionReason::PreInstall => ModuleState::PreInstalling,
        ConditionReason::InstallStarted => ModuleState::Installing,
        ConditionReason::PreUninstall | ConditionReason::UninstallStarted => {
            ModuleState::Uninstalling
        }
        ConditionReason::PreUpgrade => ModuleState::PreUpgrading,
        ConditionReason::UpgradeStarted => ModuleState::Upgrading,
        ConditionReason::UpdateStarted | ConditionReason::Reconciling => ModuleState::Reconciling,
        ConditionReason::InstallSucceeded
        | ConditionReason::UninstallSucceeded
        | ConditionReason::UpgradeSucceeded
        | ConditionReason::UpdateSucceeded
        | ConditionReason::AlreadyInstalled
        | ConditionReason::Ready
        | ConditionReason::ReconcileComplete => success_state,
        ConditionReason::InstallFailed
        | ConditionReason::UninstallFailed
        | ConditionReason::UpgradeFailed
        | ConditionReason::UpdateFailed
        | ConditionReason::Failed => ModuleState::Failed,
    }
}

/// Values filled into a `Ready` message template
#[derive(Debug, Clone, Copy)]
pub struct MessageArgs<'a> {
    pub module: &'a str,
    pub namespace: &'a str,
    pub release: &'a str,
    pub detail: Option<&'a str>,
}

/// Render the `Ready` message for a reason
#[must_use]
pub fn ready_message(reason: ConditionReason, args: &MessageArgs<'_>) -> String {
    let MessageArgs {
        module,
        namespace,
        release,
        detail,
    } = *args;
    let detail = detail.unwrap_or("unknown error");
    match reason {
        ConditionReason::PreInstall => format!(
            "Preparing to install module {module} in namespace {namespace} as Helm release {release}"
        ),
        ConditionReason::InstallStarted => format!(
            "Started installing module {module} in namespace {namespace} as Helm release {release}"
        ),
        ConditionReason::InstallSucceeded => format!(
            "Successfully installed module {module} in namespace {namespace} as Helm release {release}"
        ),
        ConditionReason::InstallFailed => format!(
            "Failed installing module {module} in namespace {namespace} as Helm release {release}: {detail}"
        ),
        ConditionReason::PreUninstall => format!(
            "Preparing to uninstall module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::UninstallStarted => format!(
            "Started uninstalling module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::UninstallSucceeded => format!(
            "Successfully uninstalled module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::UninstallFailed => format!(
            "Failed uninstalling module {module} in namespace {namespace}, Helm release {release}: {detail}"
        ),
        ConditionReason::PreUpgrade => format!(
            "Preparing to upgrade module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::UpgradeStarted => format!(
            "Started upgrading module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::UpgradeSucceeded => format!(
            "Successfully upgraded module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::UpgradeFailed => format!(
            "Failed upgrading module {module} in namespace {namespace}, Helm release {release}: {detail}"
        ),
        ConditionReason::UpdateStarted => format!(
            "Started updating module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::UpdateSucceeded => format!(
            "Successfully updated module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::UpdateFailed => format!(
            "Failed updating module {module} in namespace {namespace}, Helm release {release}: {detail}"
        ),
        ConditionReason::AlreadyInstalled => format!(
            "Module {module} in namespace {namespace} is already installed as Helm release {release}"
        ),
        ConditionReason::Ready => format!(
            "Module {module} in namespace {namespace}, Helm release {release} is ready"
        ),
        ConditionReason::Reconciling => format!(
            "Reconciling module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::ReconcileComplete => format!(
            "Reconciled module {module} in namespace {namespace}, Helm release {release}"
        ),
        ConditionReason::Failed => format!(
            "Module {module} in namespace {namespace}, Helm release {release} failed: {detail}"
        ),
    }
}

/// Record a `Ready` condition on the resource and move its state accordingly
///
/// Returns whether the condition list changed.
pub fn record_ready<K: LifecycleResource>(
    resource: &mut K,
    reason: ConditionReason,
    message: String,
) -> bool {
    let changed = append_condition(resource.conditions_mut(), ready_condition(reason, message));
    resource.set_state(state_for_reason(reason, K::SUCCESS_STATE));
    changed
}
