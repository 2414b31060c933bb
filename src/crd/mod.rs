//! # Custom Resource Definitions
//!
//! CRD types for the Module operator.
//!
//! - `Module` - declarative intent for one Helm-backed module
//! - `ModuleAction` - imperative, one-shot install/delete request
//! - `LifecycleResource` - the shared view both kinds expose to the reconciler

pub mod helm;
pub mod lifecycle;
pub mod module;
pub mod module_action;
pub mod status;

pub use helm::{HelmChart, HelmRelease, HelmRepo, KeySelector, ValuesSource};
pub use lifecycle::{ChartDefaults, LifecycleResource, RequestedAction};
pub use module::{Module, ModuleSpec, ModuleStatus};
pub use module_action::{
    ModuleAction, ModuleActionSpec, ModuleActionStatus, ModuleActionType, ModuleInstaller,
};
pub use status::{Condition, ConditionReason, ConditionStatus, ModuleState};
