//! # Upgrade Handler

use crate::controller::handler::{base, HandlerContext, LifecycleHandler};
use crate::controller::result::ReconcileResult;
use crate::controller::selection::LifecycleAction;
use crate::crd::{ConditionReason, LifecycleResource};
use async_trait::async_trait;

/// Moves an installed release to a newer chart version
#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeHandler;

#[async_trait]
impl<K: LifecycleResource> LifecycleHandler<K> for UpgradeHandler {
    fn action(&self) -> LifecycleAction {
        LifecycleAction::Upgrade
    }

    async fn pre_work_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::update_status(ctx, ConditionReason::PreUpgrade, None).await
    }

    async fn pre_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ctx.services
            .hooks
            .pre_work(LifecycleAction::Upgrade, &ctx.release)
            .await
    }

    async fn do_work_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::update_status(ctx, ConditionReason::UpgradeStarted, None).await
    }

    async fn do_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::upgrade_or_install(ctx, ConditionReason::UpgradeFailed).await
    }

    async fn is_work_done(&self, ctx: &mut HandlerContext<K>) -> (bool, ReconcileResult) {
        base::check_release_ready(ctx).await
    }

    async fn post_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ctx.services
            .hooks
            .post_work(LifecycleAction::Upgrade, &ctx.release)
            .await
    }

    async fn work_completed_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::complete_status(ctx, ConditionReason::UpgradeSucceeded, true).await
    }
}
