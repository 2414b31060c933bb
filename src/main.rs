//! # Module Operator
//!
//! Runs one Module controller and one ModuleAction controller per configured
//! module class, plus an HTTP server for metrics and health checks.
//!
//! Configuration comes from environment variables (see `config`); the flags
//! below take precedence over them.

use anyhow::Result;
use clap::Parser;
use module_operator::config::{self, ControllerConfig};
use module_operator::controller::handler::ClassRegistry;
use module_operator::runtime::initialization::{initialize, StartupOptions};
use module_operator::runtime::watch_loop::run_watch_loop;

#[derive(Parser, Debug)]
#[command(name = "module-operator")]
#[command(about = "Kubernetes operator for Helm-backed Module resources", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log Helm and status changes without applying them
    #[arg(long)]
    dry_run: bool,

    /// Comma separated module classes to reconcile
    #[arg(long, value_delimiter = ',')]
    classes: Option<Vec<String>>,

    /// Port for metrics and health checks
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Kubeconfig context to use
    #[arg(long)]
    kube_context: Option<String>,

    /// Only watch resources in this namespace
    #[arg(long)]
    watch_namespace: Option<String>,

    /// Deadline for a single helm invocation
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    helm_timeout_secs: Option<u64>,
}

impl Cli {
    fn apply(&self, controller_config: &mut ControllerConfig, server_config: &mut config::ServerConfig) {
        if self.dry_run {
            controller_config.dry_run = true;
        }
        if let Some(classes) = &self.classes {
            let classes = config::parse_classes(&classes.join(","));
            if !classes.is_empty() {
                controller_config.module_classes = classes;
            }
        }
        if let Some(port) = self.metrics_port {
            server_config.metrics_port = port;
        }
        if let Some(namespace) = self.watch_namespace.as_ref().filter(|ns| !ns.is_empty()) {
            controller_config.watch_namespace = Some(namespace.clone());
        }
        if let Some(secs) = self.helm_timeout_secs {
            controller_config.helm_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut controller_config, mut server_config) = config::load_config();
    cli.apply(&mut controller_config, &mut server_config);

    let init_result = initialize(
        StartupOptions {
            log_level: cli.log_level,
            kube_context: cli.kube_context,
        },
        controller_config,
        &server_config,
    )
    .await?;

    run_watch_loop(init_result, &ClassRegistry::with_defaults()).await;

    Ok(())
}
