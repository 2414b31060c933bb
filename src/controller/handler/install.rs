//! # Install Handler

use crate::controller::handler::{base, overrides, HandlerContext, LifecycleHandler};
use crate::controller::result::ReconcileResult;
use crate::controller::selection::LifecycleAction;
use crate::controller::status;
use crate::controller::tracker::TrackerEntry;
use crate::crd::{ConditionReason, LifecycleResource};
use crate::helm::ReleaseStatus;
use crate::observability;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::info;

/// Time since the install first reached PreInstall
fn install_elapsed(entry: &TrackerEntry) -> Option<Duration> {
    let started = entry.pre_install_timestamp()?;
    (Utc::now() - started).to_std().ok()
}

/// Installs a release that does not exist yet
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallHandler;

#[async_trait]
impl<K: LifecycleResource> LifecycleHandler<K> for InstallHandler {
    fn action(&self) -> LifecycleAction {
        LifecycleAction::Install
    }

    async fn is_work_needed(&self, ctx: &mut HandlerContext<K>) -> (bool, ReconcileResult) {
        let needed = !ctx.cr.state().is_some_and(|state| state.is_terminal());
        (needed, ReconcileResult::new())
    }

    async fn pre_work_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ctx.entry.mark_pre_install();
        base::update_status(ctx, ConditionReason::PreInstall, None).await
    }

    /// Pin an unset desired version to the chart's own version
    ///
    /// The resource is written back and the pass requeued so the next pass
    /// works from the canonical version.
    async fn pre_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        if ctx.cr.desired_version().is_empty() {
            let credentials = match overrides::resolve_credentials(
                ctx.services.cluster.as_ref(),
                &ctx.cr.namespace_or_default(),
                &ctx.release.repository,
            )
            .await
            {
                Ok(credentials) => credentials,
                Err(e) => {
                    return base::fail_work(ctx, ConditionReason::InstallFailed, e.into()).await
                }
            };
            let version = match ctx
                .services
                .helm
                .chart_version(&ctx.release, credentials.as_ref())
                .await
            {
                Ok(version) => version,
                Err(e) => {
                    return base::fail_work(ctx, ConditionReason::InstallFailed, e.into()).await
                }
            };

            info!(version = %version, "Setting desired version to the chart version");
            ctx.cr.set_desired_version(&version);
            let result = status::persist_resource(ctx.services.store.as_ref(), &mut ctx.cr).await;
            if result.should_requeue() {
                return result;
            }
            ctx.refresh_release();
            return ReconcileResult::short_delay();
        }

        ctx.services
            .hooks
            .pre_work(LifecycleAction::Install, &ctx.release)
            .await
    }

    async fn do_work_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::update_status(ctx, ConditionReason::InstallStarted, None).await
    }

    async fn do_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        if !ctx.dry_run {
            let release = &ctx.release;
            match ctx
                .services
                .helm
                .release_info(&release.name, &release.namespace)
                .await
            {
                // A failed install is retried; anything else is left to converge
                Ok(Some(info)) if info.status != ReleaseStatus::Failed => {
                    info!(
                        release = %release.name,
                        status = %info.status,
                        "Helm release already installed"
                    );
                    return ReconcileResult::new();
                }
                Ok(_) => {}
                Err(e) => return ReconcileResult::short_delay_with_error(e),
            }
        }
        base::upgrade_or_install(ctx, ConditionReason::InstallFailed).await
    }

    async fn is_work_done(&self, ctx: &mut HandlerContext<K>) -> (bool, ReconcileResult) {
        base::check_release_ready(ctx).await
    }

    async fn post_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ctx.services
            .hooks
            .post_work(LifecycleAction::Install, &ctx.release)
            .await
    }

    async fn work_completed_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        let result = base::complete_status(ctx, ConditionReason::InstallSucceeded, true).await;
        if !result.should_requeue() {
            if let Some(elapsed) = install_elapsed(&ctx.entry) {
                info!(
                    release = %ctx.release.name,
                    elapsed_secs = elapsed.as_secs(),
                    "Install completed"
                );
                observability::metrics::observe_install_duration(elapsed.as_secs_f64());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Module, ModuleState};
    use crate::testing::{module, Harness};

    #[tokio::test]
    async fn test_terminal_resource_needs_no_work() {
        let harness = Harness::new();
        let mut m = module("m", "0.1.0");
        m.set_state(ModuleState::NotNeeded);
        let mut ctx = harness.context(harness.modules.insert(m));
        let (needed, _) = LifecycleHandler::<Module>::is_work_needed(&InstallHandler, &mut ctx).await;
        assert!(!needed);
    }

    #[tokio::test]
    async fn test_empty_version_is_pinned_to_chart() {
        let harness = Harness::new();
        harness.helm.set_chart_version("helm", "0.1.0");
        let mut ctx = harness.context(harness.modules.insert(module("m", "")));

        let result = LifecycleHandler::<Module>::pre_work(&InstallHandler, &mut ctx).await;
        assert!(result.should_requeue());
        assert!(!result.is_error());

        let stored: Module = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(stored.spec.version, "0.1.0");
        assert_eq!(ctx.release.chart.version, "0.1.0");
    }

    #[tokio::test]
    async fn test_existing_release_is_left_alone() {
        let harness = Harness::new();
        harness
            .helm
            .seed_release("default", "m", "0.0.9", ReleaseStatus::PendingInstall);
        let mut ctx = harness.context(harness.modules.insert(module("m", "0.1.0")));

        let result = LifecycleHandler::<Module>::do_work(&InstallHandler, &mut ctx).await;
        assert!(!result.should_requeue());
        assert_eq!(harness.helm.apply_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_release_is_retried() {
        let harness = Harness::new();
        harness
            .helm
            .seed_release("default", "m", "0.1.0", ReleaseStatus::Failed);
        let mut ctx = harness.context(harness.modules.insert(module("m", "0.1.0")));

        LifecycleHandler::<Module>::do_work(&InstallHandler, &mut ctx).await;
        assert_eq!(harness.helm.apply_count(), 1);
    }

    #[test]
    fn test_install_elapsed_starts_at_pre_install() {
        let harness = Harness::new();
        let ctx = harness.context(module("m", "0.1.0"));
        assert!(install_elapsed(&ctx.entry).is_none());

        ctx.entry.mark_pre_install();
        let elapsed = install_elapsed(&ctx.entry).unwrap();
        assert!(elapsed < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_completion_keeps_pre_install_stamp() {
        let harness = Harness::new();
        let mut ctx = harness.context(harness.modules.insert(module("m", "0.1.0")));
        LifecycleHandler::<Module>::pre_work_update_status(&InstallHandler, &mut ctx).await;
        let stamp = ctx.entry.pre_install_timestamp();
        assert!(stamp.is_some());

        let result =
            LifecycleHandler::<Module>::work_completed_update_status(&InstallHandler, &mut ctx).await;
        assert!(!result.should_requeue());
        assert_eq!(ctx.entry.pre_install_timestamp(), stamp);
        let stored: Module = harness.modules.fetch("default", "m").unwrap();
        assert_eq!(stored.state(), Some(ModuleState::Ready));
    }
}
