//! # Base Helm Handler
//!
//! Work shared by the install, update and upgrade handlers: resolving values,
//! running `helm upgrade --install`, checking that a release is deployed and
//! ready, and recording conditions.

use crate::controller::conditions;
use crate::controller::handler::overrides::{self, OverrideError};
use crate::controller::handler::HandlerContext;
use crate::controller::result::ReconcileResult;
use crate::controller::status;
use crate::crd::{ConditionReason, LifecycleResource};
use crate::helm::manifest;
use crate::helm::values::{self, merge_all};
use crate::helm::{ReleaseOptions, ReleaseStatus};
use tracing::{error, info};

/// Class base values followed by the resource's resolved overrides
///
/// # Errors
///
/// Propagates override resolution failures.
pub async fn resolve_values<K: LifecycleResource>(
    ctx: &HandlerContext<K>,
) -> Result<Vec<serde_json::Value>, OverrideError> {
    let mut documents: Vec<serde_json::Value> = ctx
        .services
        .hooks
        .base_values(&ctx.release)
        .into_iter()
        .collect();
    documents.extend(
        overrides::resolve_overrides(
            ctx.services.cluster.as_ref(),
            &ctx.cr.namespace_or_default(),
            ctx.cr.overrides(),
        )
        .await?,
    );
    Ok(documents)
}

/// Digest of the values the resource currently asks for
///
/// # Errors
///
/// Propagates override resolution failures.
pub async fn desired_values_digest<K: LifecycleResource>(
    ctx: &HandlerContext<K>,
) -> Result<String, OverrideError> {
    let documents = resolve_values(ctx).await?;
    Ok(values::digest(&merge_all(documents)))
}

/// Record a `Ready` condition and persist the status when anything changed
pub async fn update_status<K: LifecycleResource>(
    ctx: &mut HandlerContext<K>,
    reason: ConditionReason,
    detail: Option<&str>,
) -> ReconcileResult {
    let message = ctx.message(reason, detail);
    let previous_state = ctx.cr.state();
    let changed = conditions::record_ready(&mut ctx.cr, reason, message);
    if !changed && previous_state == ctx.cr.state() {
        return ReconcileResult::new();
    }
    status::persist_status(ctx.services.store.as_ref(), &mut ctx.cr).await
}

/// Record a failure condition and return a requeue carrying the error
pub async fn fail_work<K: LifecycleResource>(
    ctx: &mut HandlerContext<K>,
    reason: ConditionReason,
    error: anyhow::Error,
) -> ReconcileResult {
    let detail = format!("{error:#}");
    error!("{} failed: {}", reason, detail);
    let persisted = update_status(ctx, reason, Some(&detail)).await;
    if let Some(persist_error) = persisted.error() {
        error!("Failed to record {} condition: {:#}", reason, persist_error);
    }
    ReconcileResult::short_delay_with_error(error)
}

/// Record the completion condition, the observed generation and, for the
/// kinds that track it, the last successful version
pub async fn complete_status<K: LifecycleResource>(
    ctx: &mut HandlerContext<K>,
    reason: ConditionReason,
    record_success: bool,
) -> ReconcileResult {
    let generation = ctx.cr.generation_or_zero();
    let message = ctx.message(reason, None);
    conditions::record_ready(&mut ctx.cr, reason, message);
    ctx.cr.set_observed_generation(generation);
    if record_success {
        let version = ctx.cr.desired_version().to_string();
        ctx.cr.record_success(&version, generation);
    }
    status::persist_status(ctx.services.store.as_ref(), &mut ctx.cr).await
}

/// `helm upgrade --install` the release with the resolved values
///
/// `failure_reason` is recorded on the resource when the step fails.
pub async fn upgrade_or_install<K: LifecycleResource>(
    ctx: &mut HandlerContext<K>,
    failure_reason: ConditionReason,
) -> ReconcileResult {
    let documents = match resolve_values(ctx).await {
        Ok(documents) => documents,
        Err(e) => return fail_work(ctx, failure_reason, e.into()).await,
    };
    let digest = values::digest(&merge_all(documents.iter().cloned()));

    if ctx.dry_run {
        info!(
            release = %ctx.release.name,
            namespace = %ctx.release.namespace,
            "Dry run: skipping helm upgrade --install"
        );
        ctx.entry.set_values_digest(digest);
        return ReconcileResult::new();
    }

    let credentials = match overrides::resolve_credentials(
        ctx.services.cluster.as_ref(),
        &ctx.cr.namespace_or_default(),
        &ctx.release.repository,
    )
    .await
    {
        Ok(credentials) => credentials,
        Err(e) => return fail_work(ctx, failure_reason, e.into()).await,
    };
    let documents = match overrides::to_yaml_documents(&documents) {
        Ok(documents) => documents,
        Err(e) => return fail_work(ctx, failure_reason, e.into()).await,
    };

    let options = ReleaseOptions {
        release: ctx.release.clone(),
        credentials,
        overrides: documents,
        wait: false,
        dry_run: false,
    };
    match ctx.services.helm.upgrade_or_install(&options).await {
        Ok(release) => {
            info!(
                release = %release.name,
                namespace = %release.namespace,
                status = %release.status,
                chart_version = %release.chart_version,
                "Helm release applied"
            );
            ctx.entry.set_values_digest(digest);
            ReconcileResult::new()
        }
        Err(e) => fail_work(ctx, failure_reason, e.into()).await,
    }
}

/// Whether the release is deployed at the desired chart version with every
/// workload it deploys ready
pub async fn check_release_ready<K: LifecycleResource>(
    ctx: &mut HandlerContext<K>,
) -> (bool, ReconcileResult) {
    if ctx.dry_run {
        return (true, ReconcileResult::new());
    }

    let helm = ctx.services.helm.as_ref();
    let release = &ctx.release;
    let info = match helm.release_info(&release.name, &release.namespace).await {
        Ok(Some(info)) => info,
        Ok(None) => {
            info!(release = %release.name, "Waiting for Helm release to be created");
            return (false, ReconcileResult::new());
        }
        Err(e) => return (false, ReconcileResult::short_delay_with_error(e)),
    };

    if info.status != ReleaseStatus::Deployed {
        info!(
            release = %release.name,
            status = %info.status,
            "Waiting for Helm release to be deployed"
        );
        return (false, ReconcileResult::new());
    }

    let desired = ctx.cr.desired_version();
    if !desired.is_empty() && info.chart_version.trim() != desired {
        info!(
            release = %release.name,
            installed = %info.chart_version,
            desired = %desired,
            "Waiting for Helm release to reach the desired chart version"
        );
        return (false, ReconcileResult::new());
    }

    let manifest = match helm.manifest(&release.name, &release.namespace).await {
        Ok(manifest) => manifest,
        Err(e) => return (false, ReconcileResult::short_delay_with_error(e)),
    };
    let workloads = match manifest::workloads(&manifest, &release.namespace) {
        Ok(workloads) => workloads,
        Err(e) => return (false, ReconcileResult::short_delay_with_error(e)),
    };
    for workload in &workloads {
        match ctx.services.cluster.workload_ready(workload).await {
            Ok(true) => {}
            Ok(false) => {
                info!(release = %release.name, "Waiting for {} to be ready", workload);
                return (false, ReconcileResult::new());
            }
            Err(e) => return (false, ReconcileResult::short_delay_with_error(e)),
        }
    }
    (true, ReconcileResult::new())
}
