//! # Watch Loop
//!
//! One Module controller and one ModuleAction controller per configured module
//! class, run together until shutdown. Module controllers also watch labelled
//! ConfigMaps and Secrets so value-source edits reach the owning Module.

use crate::cluster::{KubeCluster, KubeStore};
use crate::config::ControllerConfig;
use crate::constants::MODULE_OWNER_LABEL;
use crate::controller::handler::{ClassRegistry, Services};
use crate::controller::watches::{applied_sources, owner_requests};
use crate::controller::{reconcile, Reconciler};
use crate::crd::{LifecycleResource, Module, ModuleAction};
use crate::helm::{HelmCli, HelmEngine};
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::runtime::initialization::InitializationResult;
use futures::future::join_all;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use kube_runtime::controller::{self, Controller};
use kube_runtime::watcher::{watcher, Config as WatcherConfig};
use kube_runtime::WatchStreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Watcher timeout (seconds); must stay below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Run every controller until a shutdown signal is received
pub async fn run_watch_loop(init: InitializationResult, registry: &ClassRegistry) {
    let controllers = build_controllers(&init, registry);
    info!("Starting {} controllers", controllers.len());
    join_all(controllers).await;
    info!("All controllers stopped");
}

/// Controller futures for every configured class
pub fn build_controllers(init: &InitializationResult, registry: &ClassRegistry) -> Vec<ControllerFuture> {
    let config = &init.controller_config;
    let helm: Arc<dyn HelmEngine> = Arc::new(
        HelmCli::new(config.helm_binary.clone(), init.kube_context.clone())
            .with_timeout(config.helm_timeout()),
    );

    let mut controllers: Vec<ControllerFuture> = Vec::new();
    for class in &config.module_classes {
        if !registry.is_registered(class) {
            info!("No hooks registered for class '{}', using generic Helm behaviour", class);
        }
        info!("- Module controller (class {})", class);
        controllers.push(module_controller(&init.client, config, registry, Arc::clone(&helm), class));
        info!("- ModuleAction controller (class {})", class);
        controllers.push(module_action_controller(&init.client, config, registry, Arc::clone(&helm), class));
    }
    controllers
}

fn reconciler_for<K: LifecycleResource>(
    client: &Client,
    config: &ControllerConfig,
    registry: &ClassRegistry,
    helm: Arc<dyn HelmEngine>,
    class: &str,
) -> Arc<Reconciler<K>> {
    let services = Services {
        store: Arc::new(KubeStore::<K>::new(client.clone())),
        cluster: Arc::new(KubeCluster::new(client.clone())),
        helm,
        hooks: registry.hooks_for(class),
        chart_defaults: config.chart_defaults(),
    };
    Arc::new(Reconciler::new(services, class, config.dry_run))
}

fn api_for<K>(client: &Client, config: &ControllerConfig) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match &config.watch_namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn module_controller(
    client: &Client,
    config: &ControllerConfig,
    registry: &ClassRegistry,
    helm: Arc<dyn HelmEngine>,
    class: &str,
) -> ControllerFuture {
    let reconciler = reconciler_for::<Module>(client, config, registry, helm, class);
    let controller = Controller::new(
        api_for::<Module>(client, config),
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let owners = controller.store();
    let secret_owners = owners.clone();
    let config_map_class = class.to_string();
    let secret_class = class.to_string();

    // Only labelled value sources are listed; deletions never enqueue the owner
    let sources = WatcherConfig::default()
        .labels(MODULE_OWNER_LABEL)
        .timeout(WATCH_TIMEOUT_SECS);
    let config_maps = applied_sources(
        watcher(api_for::<ConfigMap>(client, config), sources.clone()).default_backoff(),
    );
    let secrets =
        applied_sources(watcher(api_for::<Secret>(client, config), sources).default_backoff());

    Box::pin(
        controller
            .watches_stream(config_maps, move |cm| {
                owner_requests(&cm, &config_map_class, &owners)
            })
            .watches_stream(secrets, move |secret| {
                owner_requests(&secret, &secret_class, &secret_owners)
            })
            .with_config(controller::Config::default().concurrency(config.reconcile_concurrency))
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, reconciler)
            .for_each(log_reconcile_result("Module")),
    )
}

fn module_action_controller(
    client: &Client,
    config: &ControllerConfig,
    registry: &ClassRegistry,
    helm: Arc<dyn HelmEngine>,
    class: &str,
) -> ControllerFuture {
    let reconciler = reconciler_for::<ModuleAction>(client, config, registry, helm, class);
    Box::pin(
        Controller::new(
            api_for::<ModuleAction>(client, config),
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .with_config(controller::Config::default().concurrency(config.reconcile_concurrency))
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(log_reconcile_result("ModuleAction")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
