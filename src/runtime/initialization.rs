//! # Initialization
//!
//! Operator startup: rustls setup, tracing, metrics, server startup and
//! Kubernetes client creation.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::crd::Module;
use crate::observability;
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::config::KubeConfigOptions;
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Process-level options taken from the command line
#[derive(Debug, Clone)]
pub struct StartupOptions {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Kubeconfig context; `None` infers in-cluster or the current context
    pub kube_context: Option<String>,
}

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub controller_config: ControllerConfig,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub kube_context: Option<String>,
}

/// Initialize the operator runtime
///
/// Installs the rustls crypto provider, sets up tracing, registers metrics,
/// starts the HTTP server and waits for it to bind, then creates the client.
///
/// # Errors
///
/// Fails when any of those steps fails.
pub async fn initialize(
    options: StartupOptions,
    controller_config: ControllerConfig,
    server_config: &ServerConfig,
) -> Result<InitializationResult> {
    // Must precede any rustls use
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("module_operator={}", options.log_level).into()),
        )
        .init();

    info!("Starting Module Operator v{}", env!("CARGO_PKG_VERSION"));
    info!(
        classes = ?controller_config.module_classes,
        dry_run = controller_config.dry_run,
        charts_dir = %controller_config.charts_dir.display(),
        "Controller configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, server_config).await?;

    let client = kube_client(options.kube_context.clone()).await?;

    log_startup_summary(&client, controller_config.watch_namespace.as_deref()).await;

    Ok(InitializationResult {
        client,
        controller_config,
        server_state,
        kube_context: options.kube_context,
    })
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("controller_config", &self.controller_config)
            .field("server_state", &self.server_state)
            .field("kube_context", &self.kube_context)
            .finish_non_exhaustive()
    }
}

async fn kube_client(context: Option<String>) -> Result<Client> {
    let config = match context {
        Some(context) => {
            info!("Using kubeconfig context {}", context);
            kube::Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(context),
                ..KubeConfigOptions::default()
            })
            .await
            .context("Failed to load kubeconfig context")?
        }
        None => kube::Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };
    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Poll until the HTTP server is bound
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(server_config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Log the Modules that already exist, grouped by namespace
async fn log_startup_summary(client: &Client, namespace: Option<&str>) {
    let modules: Api<Module> = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    match modules.list(&ListParams::default()).await {
        Ok(list) if list.items.is_empty() => {
            info!("No existing Module resources found, watch will pick up new resources");
        }
        Ok(list) => {
            let names: Vec<(String, String)> = list
                .items
                .iter()
                .map(|m| (m.namespace().unwrap_or_default(), m.name_any()))
                .collect();
            for line in summary_lines(&names) {
                info!("{}", line);
            }
        }
        Err(e) => {
            error!("Module CRD is not queryable; {}. Is the CRD installed?", e);
            warn!("Continuing despite CRD queryability check failure - controllers will retry");
        }
    }
}

/// Startup summary of `(namespace, name)` pairs
fn summary_lines(resources: &[(String, String)]) -> Vec<String> {
    let mut by_namespace: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (namespace, name) in resources {
        by_namespace.entry(namespace).or_default().push(name);
    }

    let mut lines = vec![
        "Module Operator - Startup Resource Summary".to_string(),
        format!("Total Modules: {}", resources.len()),
        format!("Namespaces: {}", by_namespace.len()),
    ];
    for (namespace, mut names) in by_namespace {
        names.sort_unstable();
        let shown = if names.len() <= 3 {
            names.join(", ")
        } else {
            format!("{}, ... ({} total)", names[..3].join(", "), names.len())
        };
        lines.push(format!("Namespace: {namespace}"));
        lines.push(format!("  Modules ({}): {}", names.len(), shown));
    }
    lines
}
