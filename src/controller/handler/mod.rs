//! # Lifecycle Handlers
//!
//! The handler SPI driven by the state machine, the reconcile-scoped
//! [`HandlerContext`], and the concrete handlers for each lifecycle action.
//!
//! ## Sub-modules
//!
//! - `base` - shared Helm work: upgrade-or-install, readiness, status bookkeeping
//! - `install`, `update`, `upgrade`, `delete` - one handler per action
//! - `hooks` - per module class pre/post work hooks
//! - `overrides` - value-source resolution

pub mod base;
pub mod delete;
pub mod hooks;
pub mod install;
pub mod overrides;
pub mod update;
pub mod upgrade;

pub use delete::DeleteHandler;
pub use hooks::{ClassHooks, ClassRegistry, HelmClassHooks};
pub use install::InstallHandler;
pub use update::UpdateHandler;
pub use upgrade::UpgradeHandler;

use crate::cluster::{ClusterReader, ResourceStore};
use crate::controller::conditions::{self, MessageArgs};
use crate::controller::result::ReconcileResult;
use crate::controller::selection::LifecycleAction;
use crate::controller::tracker::TrackerEntry;
use crate::crd::{ChartDefaults, ConditionReason, LifecycleResource};
use crate::helm::{HelmEngine, ReleaseDescriptor};
use async_trait::async_trait;
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use tracing::Span;

/// Collaborators shared by every reconcile of one controller
pub struct Services<K> {
    pub store: Arc<dyn ResourceStore<K>>,
    pub cluster: Arc<dyn ClusterReader>,
    pub helm: Arc<dyn HelmEngine>,
    pub hooks: Arc<dyn ClassHooks>,
    pub chart_defaults: ChartDefaults,
}

impl<K> fmt::Debug for Services<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("chart_defaults", &self.chart_defaults)
            .finish_non_exhaustive()
    }
}

/// Everything one reconcile pass needs
pub struct HandlerContext<K: LifecycleResource> {
    pub services: Arc<Services<K>>,
    /// Reconcile span; handlers log inside it
    pub span: Span,
    pub dry_run: bool,
    /// Local copy of the resource; status changes are made here then persisted
    pub cr: K,
    pub release: ReleaseDescriptor,
    pub entry: Arc<TrackerEntry>,
}

impl<K: LifecycleResource> fmt::Debug for HandlerContext<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("resource", &self.cr.name_any())
            .field("release", &self.release)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl<K: LifecycleResource> HandlerContext<K> {
    pub fn new(services: Arc<Services<K>>, cr: K, entry: Arc<TrackerEntry>, dry_run: bool) -> Self {
        let release = cr.release_descriptor(&services.chart_defaults);
        let span = tracing::info_span!(
            "reconcile",
            resource.kind = %K::kind(&()),
            resource.namespace = %cr.namespace_or_default(),
            resource.name = %cr.name_any(),
            resource.generation = cr.generation_or_zero(),
        );
        Self {
            services,
            span,
            dry_run,
            cr,
            release,
            entry,
        }
    }

    /// Rebuild the release descriptor after the resource changed
    pub fn refresh_release(&mut self) {
        self.release = self.cr.release_descriptor(&self.services.chart_defaults);
    }

    /// Render the `Ready` message for this resource
    #[must_use]
    pub fn message(&self, reason: ConditionReason, detail: Option<&str>) -> String {
        let module = self.cr.name_any();
        conditions::ready_message(
            reason,
            &MessageArgs {
                module: &module,
                namespace: &self.release.namespace,
                release: &self.release.name,
                detail,
            },
        )
    }
}

/// Work-specific steps plugged into the lifecycle state machine
///
/// Every step is called at most once per reconcile pass and must be idempotent
/// against the cluster: the tracker is memory-only, so any step may run again
/// after an operator restart.
#[async_trait]
pub trait LifecycleHandler<K: LifecycleResource>: Send + Sync {
    fn action(&self) -> LifecycleAction;

    /// Tag used in log messages
    fn work_name(&self) -> &'static str {
        self.action().work_name()
    }

    /// `false` ends the machine without doing any work
    async fn is_work_needed(&self, _ctx: &mut HandlerContext<K>) -> (bool, ReconcileResult) {
        (true, ReconcileResult::new())
    }

    async fn pre_work_update_status(&self, _ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ReconcileResult::new()
    }

    async fn pre_work(&self, _ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ReconcileResult::new()
    }

    async fn do_work_update_status(&self, _ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ReconcileResult::new()
    }

    async fn do_work(&self, _ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ReconcileResult::new()
    }

    async fn is_work_done(&self, _ctx: &mut HandlerContext<K>) -> (bool, ReconcileResult) {
        (true, ReconcileResult::new())
    }

    async fn post_work_update_status(&self, _ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ReconcileResult::new()
    }

    async fn post_work(&self, _ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ReconcileResult::new()
    }

    async fn work_completed_update_status(&self, _ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ReconcileResult::new()
    }
}

/// Handler for an action
#[must_use]
pub fn handler_for<K: LifecycleResource>(action: LifecycleAction) -> Box<dyn LifecycleHandler<K>> {
    match action {
        LifecycleAction::Install => Box::new(InstallHandler),
        LifecycleAction::Update => Box::new(UpdateHandler),
        LifecycleAction::Upgrade => Box::new(UpgradeHandler),
        LifecycleAction::Delete => Box::new(DeleteHandler),
    }
}
