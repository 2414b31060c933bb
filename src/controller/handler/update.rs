//! # Update Handler
//!
//! Re-applies the current chart version with the current values. There is no
//! pre-update condition; the first condition recorded is `UpdateStarted`.

use crate::controller::handler::{base, HandlerContext, LifecycleHandler};
use crate::controller::result::ReconcileResult;
use crate::controller::selection::LifecycleAction;
use crate::crd::{ConditionReason, LifecycleResource};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateHandler;

#[async_trait]
impl<K: LifecycleResource> LifecycleHandler<K> for UpdateHandler {
    fn action(&self) -> LifecycleAction {
        LifecycleAction::Update
    }

    async fn pre_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ctx.services
            .hooks
            .pre_work(LifecycleAction::Update, &ctx.release)
            .await
    }

    async fn do_work_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::update_status(ctx, ConditionReason::UpdateStarted, None).await
    }

    async fn do_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::upgrade_or_install(ctx, ConditionReason::UpdateFailed).await
    }

    async fn is_work_done(&self, ctx: &mut HandlerContext<K>) -> (bool, ReconcileResult) {
        base::check_release_ready(ctx).await
    }

    async fn post_work(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        ctx.services
            .hooks
            .post_work(LifecycleAction::Update, &ctx.release)
            .await
    }

    async fn work_completed_update_status(&self, ctx: &mut HandlerContext<K>) -> ReconcileResult {
        base::complete_status(ctx, ConditionReason::UpdateSucceeded, true).await
    }
}
