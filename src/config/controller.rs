//! # Controller Configuration
//!
//! Which module classes this operator drives and how it runs Helm.

use super::{env_var_opt, env_var_or_default};
use crate::constants::{
    DEFAULT_CHARTS_DIR, DEFAULT_HELM_BINARY, DEFAULT_HELM_TIMEOUT_SECS, DEFAULT_MODULE_CLASS,
    DEFAULT_RECONCILE_CONCURRENCY,
};
use crate::crd::{ChartDefaults, HelmRepo};
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Module classes to reconcile; one controller pair is started per class
    pub module_classes: Vec<String>,
    /// Log Helm and status changes without applying them
    pub dry_run: bool,
    /// Directory holding one chart per module class
    pub charts_dir: PathBuf,
    /// Helm executable
    pub helm_binary: String,
    /// Deadline for one helm invocation (seconds)
    pub helm_timeout_secs: u64,
    /// Repository used when a resource names none
    pub default_helm_repo_url: Option<String>,
    /// Maximum concurrent reconciles per controller
    pub reconcile_concurrency: u16,
    /// Restrict watches to one namespace; `None` watches all
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            module_classes: vec![DEFAULT_MODULE_CLASS.to_string()],
            dry_run: false,
            charts_dir: PathBuf::from(DEFAULT_CHARTS_DIR),
            helm_binary: DEFAULT_HELM_BINARY.to_string(),
            helm_timeout_secs: DEFAULT_HELM_TIMEOUT_SECS,
            default_helm_repo_url: None,
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            module_classes: env_var_opt("MODULE_CLASSES")
                .map(|v| parse_classes(&v))
                .filter(|classes| !classes.is_empty())
                .unwrap_or(defaults.module_classes),
            dry_run: env_var_or_default("DRY_RUN", defaults.dry_run),
            charts_dir: env_var_opt("CHARTS_DIR").map_or(defaults.charts_dir, PathBuf::from),
            helm_binary: env_var_opt("HELM_BINARY").unwrap_or(defaults.helm_binary),
            helm_timeout_secs: env_var_or_default("HELM_TIMEOUT_SECS", defaults.helm_timeout_secs)
                .max(1),
            default_helm_repo_url: env_var_opt("DEFAULT_HELM_REPO_URL"),
            reconcile_concurrency: env_var_or_default(
                "RECONCILE_CONCURRENCY",
                defaults.reconcile_concurrency,
            ),
            watch_namespace: env_var_opt("WATCH_NAMESPACE"),
        }
    }

    #[must_use]
    pub fn helm_timeout(&self) -> Duration {
        Duration::from_secs(self.helm_timeout_secs)
    }

    /// Chart location defaults handed to every handler
    #[must_use]
    pub fn chart_defaults(&self) -> ChartDefaults {
        ChartDefaults {
            charts_dir: self.charts_dir.clone(),
            repo: HelmRepo {
                uri: self.default_helm_repo_url.clone().unwrap_or_default(),
                ..HelmRepo::default()
            },
        }
    }
}

/// Split a comma separated class list, dropping blanks and duplicates
#[must_use]
pub fn parse_classes(value: &str) -> Vec<String> {
    let mut classes: Vec<String> = Vec::new();
    for class in value.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
    }
    classes
}
