//! # Controller Dispatcher
//!
//! One reconcile pass for a queued (namespace, name):
//!
//! 1. Fetch the resource; a missing resource purges its tracker entries
//! 2. Leave terminal resources alone
//! 3. Finalizer gate: add it to live resources, run the delete machine and
//!    drop it for deleted ones
//! 4. Select the lifecycle action (pinned per generation)
//! 5. Build the [`HandlerContext`] and run the state machine
//!
//! [`reconcile`] adapts a pass to kube-runtime's `Controller` and drops events
//! for resources of other module classes before they reach the pass.

use crate::controller::error::ReconcilerError;
use crate::controller::finalizer;
use crate::controller::handler::{base, handler_for, DeleteHandler, HandlerContext, Services};
use crate::controller::predicates;
use crate::controller::actual_state::{self, ActualState};
use crate::controller::result::ReconcileResult;
use crate::controller::selection::{select_declarative_action, LifecycleAction};
use crate::controller::state_machine::{self, MachineState};
use crate::controller::tracker::Tracker;
use crate::crd::{LifecycleResource, RequestedAction};
use crate::helm::{values, HelmError};
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, Instrument};

/// Reconcile context for one resource kind and module class
pub struct Reconciler<K: LifecycleResource> {
    pub services: Arc<Services<K>>,
    /// Lifecycle machines, one entry per resource generation
    pub tracker: Arc<Tracker>,
    /// Deletion machines
    pub delete_tracker: Arc<Tracker>,
    /// Module class this controller instance handles
    pub class_name: String,
    pub dry_run: bool,
}

impl<K: LifecycleResource> fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("kind", &K::kind(&()))
            .field("class_name", &self.class_name)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// Outcome of action selection
enum Selection {
    Run(LifecycleAction),
    Yield(ReconcileResult),
}

impl<K: LifecycleResource> Reconciler<K> {
    /// Reconciler sharing the process-wide trackers
    pub fn new(services: Services<K>, class_name: impl Into<String>, dry_run: bool) -> Self {
        Self::with_trackers(
            services,
            Tracker::global(),
            Tracker::global_delete(),
            class_name,
            dry_run,
        )
    }

    pub fn with_trackers(
        services: Services<K>,
        tracker: Arc<Tracker>,
        delete_tracker: Arc<Tracker>,
        class_name: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            services: Arc::new(services),
            tracker,
            delete_tracker,
            class_name: class_name.into(),
            dry_run,
        }
    }

    /// Run one reconcile pass for the resource stored at (namespace, name)
    ///
    /// # Errors
    ///
    /// Returns [`ReconcilerError::Invariant`] when the resource belongs to a
    /// different module class. Every other failure is folded into the result.
    pub async fn reconcile_resource(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileResult, ReconcilerError> {
        let kind = K::kind(&());
        let mut cr = match self.services.store.get(namespace, name).await {
            Ok(Some(cr)) => cr,
            Ok(None) => {
                debug!("{} {}/{} not found, purging tracker entries", kind, namespace, name);
                self.tracker.delete_named(&kind, namespace, name);
                self.delete_tracker.delete_named(&kind, namespace, name);
                return Ok(ReconcileResult::new());
            }
            Err(e) => {
                debug!("Failed to fetch {} {}/{}: {}", kind, namespace, name, e);
                return Ok(ReconcileResult::short_delay_with_error(e));
            }
        };

        if cr.class_name() != self.class_name {
            error!(
                "{} {}/{} has class '{}' but this controller handles '{}'",
                kind,
                namespace,
                name,
                cr.class_name(),
                self.class_name
            );
            return Err(ReconcilerError::Invariant(format!(
                "{kind} {namespace}/{name} is not of class {}",
                self.class_name
            )));
        }

        if cr.is_being_deleted() {
            return Ok(self.finalize(cr).await);
        }

        if let Some(state) = cr.state().filter(|state| state.is_terminal()) {
            debug!("{} {}/{} is {}, nothing to do", kind, namespace, name, state);
            return Ok(ReconcileResult::new());
        }

        let store = self.services.store.as_ref();
        if let Some(result) = finalizer::ensure_finalizer(store, &mut cr).await {
            return Ok(result);
        }

        let entry = self.tracker.ensure(&cr, MachineState::Init);
        let mut ctx = HandlerContext::new(Arc::clone(&self.services), cr, entry, self.dry_run);
        let span = ctx.span.clone();
        self.run_lifecycle(&mut ctx).instrument(span).await
    }

    async fn run_lifecycle(
        &self,
        ctx: &mut HandlerContext<K>,
    ) -> Result<ReconcileResult, ReconcilerError> {
        if ctx.entry.state() == MachineState::End {
            match self.values_changed(ctx).await {
                Ok(true) => {
                    info!("Override values changed, re-running update");
                    ctx.entry.pin_action(LifecycleAction::Update);
                    ctx.entry.rearm();
                }
                Ok(false) => return Ok(ReconcileResult::new()),
                Err(result) => return Ok(result),
            }
        }

        let action = match ctx.entry.pinned_action() {
            Some(action) => action,
            None => match self.select_action(ctx).await {
                Selection::Run(action) => {
                    ctx.entry.pin_action(action);
                    action
                }
                Selection::Yield(result) => return Ok(result),
            },
        };

        let handler = handler_for::<K>(action);
        debug!(work = handler.work_name(), state = %ctx.entry.state(), "Running lifecycle");
        Ok(state_machine::execute(handler.as_ref(), ctx).await)
    }

    /// Pick the handler for this generation
    async fn select_action(&self, ctx: &HandlerContext<K>) -> Selection {
        match ctx.cr.requested_action() {
            RequestedAction::Delete => Selection::Run(LifecycleAction::Delete),
            RequestedAction::Declarative => match select_declarative_action(&ctx.cr) {
                Ok(action) => Selection::Run(action),
                Err(e) => {
                    error!(
                        version = %ctx.cr.desired_version(),
                        "Invalid module version: {}", e
                    );
                    Selection::Yield(ReconcileResult::short_delay_with_error(anyhow::anyhow!(
                        "invalid version '{}': {e}",
                        ctx.cr.desired_version()
                    )))
                }
            },
            RequestedAction::Reconcile => {
                let helm = ctx.services.helm.as_ref();
                let (state, result) = actual_state::get_actual_state(helm, &ctx.release).await;
                if result.should_requeue() {
                    return Selection::Yield(result);
                }
                match state {
                    ActualState::NotInstalled => Selection::Run(LifecycleAction::Install),
                    ActualState::Ready => {
                        let (needed, result) =
                            actual_state::is_upgrade_needed(helm, ctx.cr.desired_version(), &ctx.release)
                                .await;
                        if result.should_requeue() {
                            Selection::Yield(result)
                        } else if needed {
                            Selection::Run(LifecycleAction::Upgrade)
                        } else {
                            Selection::Run(LifecycleAction::Update)
                        }
                    }
                    other => {
                        info!(
                            release = %ctx.release.name,
                            "Waiting for module to leave state {} before acting", other
                        );
                        Selection::Yield(ReconcileResult::new())
                    }
                }
            }
        }
    }

    /// Whether a finished declarative update would apply different values now
    ///
    /// Only a generation that settled on `Update` is considered; install and
    /// upgrade generations are re-selected when their spec changes.
    async fn values_changed(&self, ctx: &HandlerContext<K>) -> Result<bool, ReconcileResult> {
        if ctx.cr.requested_action() != RequestedAction::Declarative {
            return Ok(false);
        }
        if !matches!(select_declarative_action(&ctx.cr), Ok(LifecycleAction::Update)) {
            return Ok(false);
        }
        let digest = base::desired_values_digest(ctx)
            .await
            .map_err(ReconcileResult::short_delay_with_error)?;
        let applied = match ctx.entry.values_digest() {
            Some(applied) => applied,
            None => {
                let baseline = self.applied_values_digest(ctx, &digest).await?;
                ctx.entry.set_values_digest(baseline.clone());
                baseline
            }
        };
        Ok(applied != digest)
    }

    /// Digest of the values the release was deployed with, used when this
    /// generation never applied values itself
    ///
    /// Falls back to `desired` in dry-run mode and when the release is gone.
    async fn applied_values_digest(
        &self,
        ctx: &HandlerContext<K>,
        desired: &str,
    ) -> Result<String, ReconcileResult> {
        if ctx.dry_run {
            return Ok(desired.to_string());
        }
        let release = &ctx.release;
        match ctx
            .services
            .helm
            .values(&release.name, &release.namespace)
            .await
        {
            Ok(deployed) => Ok(values::digest(&deployed)),
            Err(HelmError::ReleaseNotFound { .. }) => Ok(desired.to_string()),
            Err(e) => Err(ReconcileResult::short_delay_with_error(e)),
        }
    }

    /// Deletion path: run the delete machine, then drop the finalizer and
    /// forget the resource
    async fn finalize(&self, cr: K) -> ReconcileResult {
        if !finalizer::has_finalizer(&cr) {
            self.tracker.delete(&cr);
            self.delete_tracker.delete(&cr);
            return ReconcileResult::new();
        }

        let entry = self.delete_tracker.ensure(&cr, MachineState::Init);
        let mut ctx = HandlerContext::new(Arc::clone(&self.services), cr, entry, self.dry_run);
        let span = ctx.span.clone();
        async {
            let result = state_machine::execute(&DeleteHandler, &mut ctx).await;
            if result.should_requeue() {
                return result;
            }

            let result =
                finalizer::remove_finalizer(self.services.store.as_ref(), &mut ctx.cr).await;
            if result.should_requeue() {
                return result;
            }
            info!("Finalizer removed, forgetting resource");
            self.tracker.delete(&ctx.cr);
            self.delete_tracker.delete(&ctx.cr);
            ReconcileResult::new()
        }
        .instrument(span)
        .await
    }
}

/// Convert a pass result into the action kube-runtime expects
///
/// # Errors
///
/// A result carrying an error becomes [`ReconcilerError::Requeue`] so the error
/// policy logs and counts it.
pub fn into_action(result: ReconcileResult) -> Result<Action, ReconcilerError> {
    let delay = result.requeue_delay();
    if let Some(error) = result.into_error() {
        return Err(ReconcilerError::Requeue {
            delay,
            message: format!("{error:#}"),
        });
    }
    Ok(if delay.is_zero() {
        Action::await_change()
    } else {
        observability::metrics::increment_requeues_total("short-delay");
        Action::requeue(delay)
    })
}

/// kube-runtime entry point
///
/// # Errors
///
/// See [`Reconciler::reconcile_resource`] and [`into_action`].
pub async fn reconcile<K: LifecycleResource>(
    resource: Arc<K>,
    reconciler: Arc<Reconciler<K>>,
) -> Result<Action, ReconcilerError> {
    let namespace = resource.namespace_or_default();
    let name = resource.name_any();
    if !predicates::class_matches(resource.as_ref(), &reconciler.class_name) {
        debug!(
            "Ignoring {} {}/{} of class '{}'",
            K::kind(&()),
            namespace,
            name,
            resource.class_name()
        );
        return Ok(Action::await_change());
    }

    let start = Instant::now();
    observability::metrics::increment_reconciliations();
    let outcome = reconciler.reconcile_resource(&namespace, &name).await;

    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    outcome.and_then(into_action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::conditions::latest_ready;
    use crate::crd::{ConditionReason, Module, ModuleActionType, ModuleState, ValuesSource};
    use crate::helm::ReleaseStatus;
    use crate::testing::{module, module_action, Harness};
    use serde_json::json;
    use std::time::Duration;

    /// Reconcile until the pass stops asking for a requeue
    async fn converge<K: LifecycleResource>(reconciler: &Reconciler<K>, name: &str) -> ReconcileResult {
        for _ in 0..50 {
            let result = reconciler.reconcile_resource("default", name).await.unwrap();
            if !result.should_requeue() {
                return result;
            }
        }
        panic!("{name} did not converge");
    }

    fn reasons(m: &Module) -> Vec<String> {
        m.conditions().iter().map(|c| c.reason.clone()).collect()
    }

    #[tokio::test]
    async fn test_fresh_install() {
        let harness = Harness::new();
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));

        let first = reconciler.reconcile_resource("default", "m").await.unwrap();
        assert!(first.should_requeue());
        let stored = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(stored.finalizers(), &[Module::FINALIZER.to_string()]);

        converge(&reconciler, "m").await;
        let stored = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(stored.state(), Some(ModuleState::Ready));
        assert_eq!(stored.last_successful_version(), Some("0.1.0"));
        assert_eq!(stored.observed_generation(), Some(stored.generation_or_zero()));
        assert_eq!(
            reasons(&stored),
            vec!["PreInstall", "InstallStarted", "InstallSucceeded"]
        );

        let release = harness.helm.release("default", "m").unwrap();
        assert_eq!(release.chart_version, "0.1.0");
        assert_eq!(release.status, ReleaseStatus::Deployed);
    }

    #[tokio::test]
    async fn test_versionless_install_is_normalised() {
        let harness = Harness::new();
        harness.helm.set_chart_version("helm", "0.1.0");
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", ""));

        converge(&reconciler, "m").await;
        let stored = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(stored.spec.version, "0.1.0");
        assert_eq!(stored.state(), Some(ModuleState::Ready));
        assert_eq!(stored.last_successful_version(), Some("0.1.0"));
        assert_eq!(
            harness.helm.release("default", "m").unwrap().chart_version,
            "0.1.0"
        );
    }

    #[tokio::test]
    async fn test_upgrade() {
        let harness = Harness::new();
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));
        converge(&reconciler, "m").await;

        harness.modules.modify("default", "m", |m| m.spec.version = "0.1.1".to_string());
        converge(&reconciler, "m").await;

        let stored = harness.modules.fetch("default", "m").unwrap();
        let reasons = reasons(&stored);
        assert!(reasons.contains(&"UpgradeStarted".to_string()));
        assert_eq!(reasons.last().map(String::as_str), Some("UpgradeSucceeded"));
        assert_eq!(stored.last_successful_version(), Some("0.1.1"));
        assert_eq!(
            harness.helm.release("default", "m").unwrap().chart_version,
            "0.1.1"
        );
    }

    #[tokio::test]
    async fn test_override_change_during_upgrade() {
        let harness = Harness::new();
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));
        converge(&reconciler, "m").await;

        // Start an upgrade and stop while the release is still rolling out
        let workload = harness.hold_rollout("default", "m");
        harness.modules.modify("default", "m", |m| {
            m.spec.version = "0.1.1".to_string();
            m.spec.overrides = vec![ValuesSource::inline(json!({"replicas": 1}))];
        });
        for _ in 0..10 {
            reconciler.reconcile_resource("default", "m").await.unwrap();
        }
        let stored = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(
            latest_ready(stored.conditions()).map(|c| c.reason.as_str()),
            Some(ConditionReason::UpgradeStarted.as_str())
        );

        harness.modules.modify("default", "m", |m| {
            m.spec.overrides = vec![ValuesSource::inline(json!({"replicas": 3}))];
        });
        harness.cluster.set_workload_ready(&workload, true);
        converge(&reconciler, "m").await;

        let stored = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(
            harness.helm.release_values("default", "m"),
            Some(json!({"replicas": 3}))
        );
        assert_eq!(stored.last_successful_version(), Some("0.1.1"));
        assert_eq!(stored.state(), Some(ModuleState::Ready));
    }

    #[tokio::test]
    async fn test_override_precedence() {
        let harness = Harness::new();
        harness
            .cluster
            .put_secret("default", "s", "values.yaml", "a: B\nb: B\n");
        harness
            .cluster
            .put_config_map("default", "c", "values.yaml", "c: C\n");
        let reconciler = harness.module_reconciler();
        let mut m = module("m", "0.1.0");
        m.spec.overrides = vec![
            ValuesSource::inline(json!({"a": "A"})),
            ValuesSource::secret("s", "values.yaml", false),
            ValuesSource::config_map("c", "values.yaml", false),
        ];
        harness.modules.insert(m);

        converge(&reconciler, "m").await;
        assert_eq!(
            harness.helm.release_values("default", "m"),
            Some(json!({"a": "B", "b": "B", "c": "C"}))
        );
    }

    #[tokio::test]
    async fn test_deletion() {
        let harness = Harness::new();
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));
        converge(&reconciler, "m").await;
        assert!(!reconciler.tracker.is_empty());

        harness.modules.mark_deleted("default", "m");
        converge(&reconciler, "m").await;

        assert!(!harness.helm.has_release("default", "m"));
        assert!(harness.modules.fetch("default", "m").is_none());
        assert!(reconciler.tracker.is_empty());
        assert!(reconciler.delete_tracker.is_empty());
    }

    #[tokio::test]
    async fn test_config_map_edit_reruns_update() {
        let harness = Harness::new();
        harness
            .cluster
            .put_config_map("default", "c", "values.yaml", "a: 1\n");
        let reconciler = harness.module_reconciler();
        let mut m = module("m", "0.1.0");
        m.spec.overrides = vec![ValuesSource::config_map("c", "values.yaml", false)];
        harness.modules.insert(m);
        converge(&reconciler, "m").await;
        converge(&reconciler, "m").await;
        assert_eq!(harness.helm.apply_count(), 1);

        harness
            .cluster
            .put_config_map("default", "c", "values.yaml", "a: 2\n");
        converge(&reconciler, "m").await;
        assert_eq!(harness.helm.apply_count(), 2);
        assert_eq!(
            harness.helm.release_values("default", "m"),
            Some(json!({"a": 2}))
        );
    }

    #[tokio::test]
    async fn test_preinstalled_release_with_stale_values_is_updated() {
        let harness = Harness::new();
        harness
            .helm
            .seed_release("default", "m", "0.1.0", ReleaseStatus::Deployed);
        let reconciler = harness.module_reconciler();
        let mut m = module("m", "0.1.0");
        m.spec.overrides = vec![ValuesSource::inline(json!({"replicas": 2}))];
        harness.modules.insert(m);

        // Install finds the release already present and applies nothing; the
        // deployed values are then compared against the overrides
        converge(&reconciler, "m").await;
        converge(&reconciler, "m").await;
        assert_eq!(
            harness.helm.release_values("default", "m"),
            Some(json!({"replicas": 2}))
        );
        assert_eq!(harness.helm.apply_count(), 1);
    }

    #[tokio::test]
    async fn test_preinstalled_release_with_matching_values_is_left_alone() {
        let harness = Harness::new();
        harness
            .helm
            .seed_release("default", "m", "0.1.0", ReleaseStatus::Deployed);
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));

        converge(&reconciler, "m").await;
        converge(&reconciler, "m").await;
        assert_eq!(harness.helm.apply_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_install_is_recorded_then_retried() {
        let harness = Harness::new();
        harness.helm.fail_next_apply("chart download timed out");
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));

        let mut failed = None;
        for _ in 0..10 {
            let result = reconciler.reconcile_resource("default", "m").await.unwrap();
            if result.is_error() {
                failed = Some(result);
                break;
            }
        }
        let failed = failed.expect("install never failed");
        assert!(failed.requeue_delay() > Duration::ZERO);
        let stored = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(stored.state(), Some(ModuleState::Failed));
        let latest = latest_ready(stored.conditions()).unwrap();
        assert_eq!(latest.reason, ConditionReason::InstallFailed.as_str());
        assert!(latest.message.contains("chart download timed out"));

        converge(&reconciler, "m").await;
        let stored = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(stored.state(), Some(ModuleState::Ready));
        assert_eq!(
            reasons(&stored).last().map(String::as_str),
            Some("InstallSucceeded")
        );
        assert!(harness.helm.has_release("default", "m"));
    }

    #[tokio::test]
    async fn test_failed_upgrade_is_retried() {
        let harness = Harness::new();
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));
        converge(&reconciler, "m").await;

        harness.helm.fail_next_apply("another operation is in progress");
        harness.modules.modify("default", "m", |m| m.spec.version = "0.2.0".to_string());
        converge(&reconciler, "m").await;

        let stored = harness.modules.fetch("default", "m").unwrap();
        let reasons = reasons(&stored);
        assert!(reasons.contains(&"UpgradeFailed".to_string()));
        assert_eq!(reasons.last().map(String::as_str), Some("UpgradeSucceeded"));
        assert_eq!(stored.last_successful_version(), Some("0.2.0"));
        assert_eq!(
            harness.helm.release("default", "m").unwrap().chart_version,
            "0.2.0"
        );
    }

    #[tokio::test]
    async fn test_invalid_upgrade_version_is_an_error() {
        let harness = Harness::new();
        let reconciler = harness.module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));
        converge(&reconciler, "m").await;

        harness.modules.modify("default", "m", |m| m.spec.version = "latest".to_string());
        let result = reconciler.reconcile_resource("default", "m").await.unwrap();
        assert!(result.is_error());
        assert_eq!(harness.helm.apply_count(), 1);
        assert_eq!(
            harness.helm.release("default", "m").unwrap().chart_version,
            "0.1.0"
        );
    }

    #[tokio::test]
    async fn test_dry_run_rehearses_without_helm() {
        let harness = Harness::new();
        let reconciler = harness.dry_run_module_reconciler();
        harness.modules.insert(module("m", "0.1.0"));

        converge(&reconciler, "m").await;
        let stored = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(stored.state(), Some(ModuleState::Ready));
        assert_eq!(
            reasons(&stored),
            vec!["PreInstall", "InstallStarted", "InstallSucceeded"]
        );
        assert_eq!(harness.helm.apply_count(), 0);
        assert!(!harness.helm.has_release("default", "m"));

        harness.modules.mark_deleted("default", "m");
        converge(&reconciler, "m").await;
        assert!(harness.modules.fetch("default", "m").is_none());
        assert_eq!(harness.helm.uninstall_count(), 0);
    }

    #[tokio::test]
    async fn test_other_class_is_an_invariant_error() {
        let harness = Harness::new();
        let reconciler = harness.module_reconciler();
        let mut m = module("m", "0.1.0");
        m.spec.module_name = "other".to_string();
        harness.modules.insert(m);

        let error = reconciler.reconcile_resource("default", "m").await.unwrap_err();
        assert!(error.requeue_delay().is_none());
    }

    #[tokio::test]
    async fn test_other_class_events_are_dropped() {
        let harness = Harness::new();
        let reconciler = Arc::new(harness.module_reconciler());
        let mut m = module("m", "0.1.0");
        m.spec.module_name = "other".to_string();
        let m = harness.modules.insert(m);

        let action = reconcile(Arc::new(m), reconciler).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(harness.modules.fetch("default", "m").unwrap().finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_missing_resource_is_forgotten() {
        let harness = Harness::new();
        let reconciler = harness.module_reconciler();
        let result = reconciler.reconcile_resource("default", "gone").await.unwrap();
        assert!(!result.should_requeue());
    }

    #[tokio::test]
    async fn test_missing_action_keeps_module_of_same_name() {
        let harness = Harness::new();
        let (modules, actions) = harness.shared_reconcilers();
        harness.modules.insert(module("m", "0.1.0"));
        converge(&modules, "m").await;
        let before = reasons(&harness.modules.fetch("default", "m").unwrap());

        // No ModuleAction named "m" exists; its purge must not touch the Module
        actions.reconcile_resource("default", "m").await.unwrap();
        assert!(!modules.tracker.is_empty());

        converge(&modules, "m").await;
        assert_eq!(harness.helm.apply_count(), 1);
        assert_eq!(reasons(&harness.modules.fetch("default", "m").unwrap()), before);
    }

    #[tokio::test]
    async fn test_module_action_reconcile_then_complete() {
        let harness = Harness::new();
        let reconciler = harness.action_reconciler();
        harness.actions.insert(module_action("install-m", "m", "0.1.0"));

        converge(&reconciler, "install-m").await;
        let stored = harness.actions.fetch("default", "install-m").unwrap();
        assert_eq!(stored.state(), Some(ModuleState::Completed));
        assert!(harness.helm.has_release("default", "m"));

        // A completed action is never looked at again
        let applied = harness.helm.apply_count();
        let result = reconciler.reconcile_resource("default", "install-m").await.unwrap();
        assert!(!result.should_requeue());
        assert_eq!(harness.helm.apply_count(), applied);
    }

    #[tokio::test]
    async fn test_module_action_upgrades_older_release() {
        let harness = Harness::new();
        harness
            .helm
            .seed_release("default", "m", "0.1.0", ReleaseStatus::Deployed);
        let reconciler = harness.action_reconciler();
        harness.actions.insert(module_action("upgrade-m", "m", "0.2.0"));

        converge(&reconciler, "upgrade-m").await;
        let stored = harness.actions.fetch("default", "upgrade-m").unwrap();
        assert_eq!(
            latest_ready(stored.conditions()).map(|c| c.reason.as_str()),
            Some(ConditionReason::UpgradeSucceeded.as_str())
        );
        assert_eq!(
            harness.helm.release("default", "m").unwrap().chart_version,
            "0.2.0"
        );
    }

    #[tokio::test]
    async fn test_module_action_waits_for_transient_release() {
        let harness = Harness::new();
        harness
            .helm
            .seed_release("default", "m", "0.1.0", ReleaseStatus::PendingUpgrade);
        let reconciler = harness.action_reconciler();
        harness.actions.insert(module_action("a", "m", "0.1.0"));

        // First pass commits the finalizer
        reconciler.reconcile_resource("default", "a").await.unwrap();
        let result = reconciler.reconcile_resource("default", "a").await.unwrap();
        assert!(!result.should_requeue());
        assert_eq!(harness.helm.apply_count(), 0);
    }

    #[tokio::test]
    async fn test_module_action_delete_request_uninstalls() {
        let harness = Harness::new();
        harness
            .helm
            .seed_release("default", "m", "0.1.0", ReleaseStatus::Deployed);
        let reconciler = harness.action_reconciler();
        let mut action = module_action("remove-m", "m", "0.1.0");
        action.spec.action = ModuleActionType::Delete;
        harness.actions.insert(action);

        converge(&reconciler, "remove-m").await;
        let stored = harness.actions.fetch("default", "remove-m").unwrap();
        assert_eq!(stored.state(), Some(ModuleState::Completed));
        assert_eq!(
            latest_ready(stored.conditions()).map(|c| c.reason.as_str()),
            Some(ConditionReason::UninstallSucceeded.as_str())
        );
        assert!(!harness.helm.has_release("default", "m"));
        assert_eq!(harness.helm.uninstall_count(), 1);
    }

    #[tokio::test]
    async fn test_module_action_deletion_uninstalls_release() {
        let harness = Harness::new();
        let reconciler = harness.action_reconciler();
        harness.actions.insert(module_action("a", "m", "0.1.0"));
        converge(&reconciler, "a").await;
        assert!(harness.helm.has_release("default", "m"));

        harness.actions.mark_deleted("default", "a");
        converge(&reconciler, "a").await;
        assert!(harness.actions.fetch("default", "a").is_none());
        assert!(!harness.helm.has_release("default", "m"));
        assert_eq!(harness.helm.uninstall_count(), 1);
        assert!(reconciler.delete_tracker.is_empty());
    }

    #[test]
    fn test_into_action() {
        assert!(into_action(ReconcileResult::new()).is_ok());
        assert!(into_action(ReconcileResult::requeue_after(Duration::from_secs(1))).is_ok());
        let error = into_action(ReconcileResult::short_delay_with_error(anyhow::anyhow!("boom")))
            .unwrap_err();
        assert!(error.to_string().contains("boom"));
        assert!(error.requeue_delay().is_some());
    }
}
