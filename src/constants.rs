//! # Constants
//!
//! Shared constants for the Module operator.

/// Field manager used for every write the operator makes
pub const FIELD_MANAGER: &str = "module-operator";

/// Finalizer placed on Module resources
pub const MODULE_FINALIZER: &str = "module.platform.verrazzano.io/finalizer";

/// Finalizer placed on ModuleAction resources
pub const MODULE_ACTION_FINALIZER: &str = "moduleaction.platform.verrazzano.io/finalizer";

/// Label on config maps and secrets naming the Module that consumes them
pub const MODULE_OWNER_LABEL: &str = "verrazzano.io/module-owner";

/// Module class handled when no class is configured
pub const DEFAULT_MODULE_CLASS: &str = "helm";

/// Maximum number of conditions retained in a status
pub const CONDITION_ARRAY_LIMIT: usize = 5;

/// Condition type used for every lifecycle condition
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Short requeue bounds (seconds)
pub const SHORT_DELAY_MIN_SECS: u64 = 1;
pub const SHORT_DELAY_MAX_SECS: u64 = 2;

/// Keys read from a Helm repository credentials secret
pub const REPO_USERNAME_KEY: &str = "username";
pub const REPO_PASSWORD_KEY: &str = "password";

/// Default chart directory
pub const DEFAULT_CHARTS_DIR: &str = "/charts";

/// Default helm binary
pub const DEFAULT_HELM_BINARY: &str = "helm";

/// Longest a single helm invocation may run (seconds)
pub const DEFAULT_HELM_TIMEOUT_SECS: u64 = 300;

/// Default number of concurrent reconciles per controller
pub const DEFAULT_RECONCILE_CONCURRENCY: u16 = 10;

/// Default metrics and health port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue delay applied by the error policy when an error carries no delay (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 30;
