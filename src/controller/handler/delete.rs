//! # Delete Handler

use crate::controller::handler::{base, HandlerContext, LifecycleHandler};
use crate::controller::result::ReconcileResult;
use crate::controller::selection::LifecycleAction;
use crate::crd::{ConditionReason, LifecycleResource};
use async_trait::async_trait;
use tracing::info;

/// Uninstalls the release
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteHandler;

#[async_trait]
impl<K: LifecycleResource> LifecycleHandler<K> for DeleteHandler {
    fn action(&self) -> LifecycleAction {
        LifecycleAction::Delete
    }

    async fn pre_work_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::update_status(ctx, ConditionReason::PreUninstall, None).await
    }

    async fn pre_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ctx.services
            .hooks
            .pre_work(LifecycleAction::Delete, &ctx.release)
            .await
    }

    async fn do_work_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::update_status(ctx, ConditionReason::UninstallStarted, None).await
    }

    async fn do_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        let name = ctx.release.name.clone();
        let namespace = ctx.release.namespace.clone();
        if ctx.dry_run {
            info!(release = %name, namespace = %namespace, "Dry run: skipping helm uninstall");
            return ReconcileResult::new();
        }

        let helm = ctx.services.helm.as_ref();
        match helm.is_release_installed(&name, &namespace).await {
            Ok(false) => {
                info!(release = %name, "Helm release not installed, nothing to uninstall");
                return ReconcileResult::new();
            }
            Ok(true) => {}
            Err(e) => return ReconcileResult::short_delay_with_error(e),
        }

        match helm.uninstall(&name, &namespace, false).await {
            Ok(()) => ReconcileResult::new(),
            Err(e) => base::fail_work(ctx, ConditionReason::UninstallFailed, e.into()).await,
        }
    }

    async fn is_work_done(&self, ctx: &mut HandlerContext<K>) -> (bool, ReconcileResult) {
        if ctx.dry_run {
            return (true, ReconcileResult::new());
        }
        let release = &ctx.release;
        match ctx
            .services
            .helm
            .is_release_deployed(&release.name, &release.namespace)
            .await
        {
            Ok(deployed) => {
                if deployed {
                    info!(release = %release.name, "Waiting for Helm release to be uninstalled");
                }
                (!deployed, ReconcileResult::new())
            }
            Err(e) => (false, ReconcileResult::short_delay_with_error(e)),
        }
    }

    async fn post_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ctx.services
            .hooks
            .post_work(LifecycleAction::Delete, &ctx.release)
            .await
    }

    async fn work_completed_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::complete_status(ctx, ConditionReason::UninstallSucceeded, false).await
    }
}
