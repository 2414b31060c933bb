//! # Lifecycle Status
//!
//! Status types shared by the Module and ModuleAction resources: the lifecycle
//! state enum, the condition record and the condition reason vocabulary.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state recorded in `status.state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ModuleState {
    PreInstalling,
    Installing,
    Uninstalling,
    PreUpgrading,
    Upgrading,
    Ready,
    Completed,
    NotNeeded,
    Failed,
    Reconciling,
}

impl ModuleState {
    /// States after which the operator never touches the resource again
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleState::Completed | ModuleState::NotNeeded)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::PreInstalling => "PreInstalling",
            ModuleState::Installing => "Installing",
            ModuleState::Uninstalling => "Uninstalling",
            ModuleState::PreUpgrading => "PreUpgrading",
            ModuleState::Upgrading => "Upgrading",
            ModuleState::Ready => "Ready",
            ModuleState::Completed => "Completed",
            ModuleState::NotNeeded => "NotNeeded",
            ModuleState::Failed => "Failed",
            ModuleState::Reconciling => "Reconciling",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a condition (True, False, Unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Condition represents one observed transition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Machine readable reason, one of the [`ConditionReason`] values
    pub reason: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Message describing the condition
    #[serde(default)]
    pub message: String,
    /// Last transition time (ISO-8601, seconds, UTC)
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Whether two conditions describe the same observation, ignoring the timestamp
    #[must_use]
    pub fn same_observation(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.reason == other.reason
            && self.status == other.status
            && self.message == other.message
    }
}

/// Reason vocabulary used on lifecycle conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionReason {
    PreInstall,
    InstallStarted,
    InstallSucceeded,
    InstallFailed,
    PreUninstall,
    UninstallStarted,
    UninstallSucceeded,
    UninstallFailed,
    PreUpgrade,
    UpgradeStarted,
    UpgradeSucceeded,
    UpgradeFailed,
    UpdateStarted,
    UpdateSucceeded,
    UpdateFailed,
    AlreadyInstalled,
    Ready,
    Reconciling,
    ReconcileComplete,
    Failed,
}

impl ConditionReason {
    pub const ALL: [ConditionReason; 20] = [
        ConditionReason::PreInstall,
        ConditionReason::InstallStarted,
        ConditionReason::InstallSucceeded,
        ConditionReason::InstallFailed,
        ConditionReason::PreUninstall,
        ConditionReason::UninstallStarted,
        ConditionReason::UninstallSucceeded,
        ConditionReason::UninstallFailed,
        ConditionReason::PreUpgrade,
        ConditionReason::UpgradeStarted,
        ConditionReason::UpgradeSucceeded,
        ConditionReason::UpgradeFailed,
        ConditionReason::UpdateStarted,
        ConditionReason::UpdateSucceeded,
        ConditionReason::UpdateFailed,
        ConditionReason::AlreadyInstalled,
        ConditionReason::Ready,
        ConditionReason::Reconciling,
        ConditionReason::ReconcileComplete,
        ConditionReason::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionReason::PreInstall => "PreInstall",
            ConditionReason::InstallStarted => "InstallStarted",
            ConditionReason::InstallSucceeded => "InstallSucceeded",
            ConditionReason::InstallFailed => "InstallFailed",
            ConditionReason::PreUninstall => "PreUninstall",
            ConditionReason::UninstallStarted => "UninstallStarted",
            ConditionReason::UninstallSucceeded => "UninstallSucceeded",
            ConditionReason::UninstallFailed => "UninstallFailed",
            ConditionReason::PreUpgrade => "PreUpgrade",
            ConditionReason::UpgradeStarted => "UpgradeStarted",
            ConditionReason::UpgradeSucceeded => "UpgradeSucceeded",
            ConditionReason::UpgradeFailed => "UpgradeFailed",
            ConditionReason::UpdateStarted => "UpdateStarted",
            ConditionReason::UpdateSucceeded => "UpdateSucceeded",
            ConditionReason::UpdateFailed => "UpdateFailed",
            ConditionReason::AlreadyInstalled => "AlreadyInstalled",
            ConditionReason::Ready => "Ready",
            ConditionReason::Reconciling => "Reconciling",
            ConditionReason::ReconcileComplete => "ReconcileComplete",
            ConditionReason::Failed => "Failed",
        }
    }

    /// Condition status implied by the reason
    ///
    /// Completed transitions are `True`, failures and in-flight work are `False`.
    #[must_use]
    pub fn status(self) -> ConditionStatus {
        match self {
            ConditionReason::InstallSucceeded
            | ConditionReason::UninstallSucceeded
            | ConditionReason::UpgradeSucceeded
            | ConditionReason::UpdateSucceeded
            | ConditionReason::AlreadyInstalled
            | ConditionReason::Ready
            | ConditionReason::ReconcileComplete => ConditionStatus::True,
            ConditionReason::Reconciling => ConditionStatus::Unknown,
            _ => ConditionStatus::False,
        }
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConditionReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| format!("unknown condition reason '{s}'"))
    }
}
