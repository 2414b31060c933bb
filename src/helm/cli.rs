//! # Helm CLI
//!
//! [`HelmEngine`] implementation that shells out to the `helm` binary.
//! Override documents are written to temporary files and passed with `-f` in
//! list order, so later documents win.
//!
//! Every invocation runs under a deadline and is killed when its reconcile is
//! dropped.
//!
//! Repository passwords never appear on a command line. An authenticated
//! repository is registered with `helm repo add --password-stdin` into a
//! throwaway repository config, and the chart is resolved as `<repo>/<chart>`
//! against that config.

use crate::helm::{
    HelmEngine, HelmError, ReleaseDescriptor, ReleaseInfo, ReleaseOptions, ReleaseStatus,
    RepoCredentials,
};
use crate::constants::DEFAULT_HELM_TIMEOUT_SECS;
use crate::observability;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Repository alias used when the release names none
const DEFAULT_REPO_ALIAS: &str = "module-operator";

/// Repository registered with credentials for the length of one helm call
struct AuthorizedRepo {
    alias: String,
    config: NamedTempFile,
    cache: TempDir,
}

impl AuthorizedRepo {
    fn flags(&self) -> Vec<String> {
        vec![
            "--repository-config".to_string(),
            self.config.path().to_string_lossy().into_owned(),
            "--repository-cache".to_string(),
            self.cache.path().to_string_lossy().into_owned(),
        ]
    }
}

/// Release as printed by `helm upgrade -o json`
#[derive(Debug, Deserialize)]
struct ReleaseJson {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    info: Option<ReleaseInfoJson>,
    #[serde(default)]
    chart: Option<ChartJson>,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfoJson {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ChartJson {
    #[serde(default)]
    metadata: Option<ChartMetadataJson>,
}

#[derive(Debug, Deserialize)]
struct ChartMetadataJson {
    #[serde(default)]
    version: String,
}

/// Release metadata as printed by `helm get metadata -o json`
#[derive(Debug, Deserialize)]
struct MetadataJson {
    name: String,
    #[serde(default)]
    namespace: String,
    /// Chart version
    #[serde(default)]
    version: String,
    #[serde(default)]
    status: String,
}

/// Chart metadata as printed by `helm show chart`
#[derive(Debug, Deserialize)]
struct ChartYaml {
    version: String,
}

/// Helm engine backed by the `helm` binary
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: String,
    kube_context: Option<String>,
    timeout: Duration,
}

impl HelmCli {
    #[must_use]
    pub fn new(binary: impl Into<String>, kube_context: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            kube_context,
            timeout: Duration::from_secs(DEFAULT_HELM_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run helm with the given arguments and return stdout
    async fn run(&self, operation: &str, args: &[String]) -> Result<String, HelmError> {
        self.run_with_stdin(operation, args, None).await
    }

    /// Run helm, writing `stdin` to the child before waiting on it
    async fn run_with_stdin(
        &self,
        operation: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<String, HelmError> {
        let mut command = Command::new(&self.binary);
        command.args(args);
        if let Some(context) = &self.kube_context {
            command.arg("--kube-context").arg(context);
        }
        command
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(operation, "Running helm {}", args.join(" "));
        let run = async {
            let mut child = command.spawn()?;
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            child.wait_with_output().await
        };
        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(output) => output.inspect_err(|_| {
                observability::metrics::increment_helm_operations(operation, "error");
            })?,
            Err(_) => {
                error!(operation, "helm did not finish within {}s, killed", self.timeout.as_secs());
                observability::metrics::increment_helm_operations(operation, "timeout");
                return Err(HelmError::TimedOut {
                    command: operation.to_string(),
                    after: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            observability::metrics::increment_helm_operations(operation, "error");
            return Err(HelmError::CommandFailed {
                command: operation.to_string(),
                stderr,
            });
        }

        observability::metrics::increment_helm_operations(operation, "success");
        String::from_utf8(output.stdout).map_err(|e| HelmError::Parse(e.to_string()))
    }

    /// Chart reference plus the repository flags needed to resolve it
    fn chart_args(release: &ReleaseDescriptor, repo: Option<&AuthorizedRepo>) -> Vec<String> {
        let mut args = Vec::new();
        if !release.chart.path.is_empty() {
            args.push(release.chart.path.clone());
        } else if let Some(repo) = repo {
            args.push(format!("{}/{}", repo.alias, release.chart.name));
            args.extend(repo.flags());
        } else {
            args.push(release.chart.name.clone());
            if !release.repository.uri.is_empty() {
                args.push("--repo".to_string());
                args.push(release.repository.uri.clone());
            }
        }
        if !release.chart.version.is_empty() {
            args.push("--version".to_string());
            args.push(release.chart.version.clone());
        }
        args
    }

    /// `helm repo add` arguments; the password is read from stdin
    fn repo_add_args(
        alias: &str,
        uri: &str,
        username: &str,
        config: &Path,
        cache: &Path,
    ) -> Vec<String> {
        vec![
            "repo".to_string(),
            "add".to_string(),
            alias.to_string(),
            uri.to_string(),
            "--username".to_string(),
            username.to_string(),
            "--password-stdin".to_string(),
            "--force-update".to_string(),
            "--repository-config".to_string(),
            config.to_string_lossy().into_owned(),
            "--repository-cache".to_string(),
            cache.to_string_lossy().into_owned(),
        ]
    }

    /// Register the release's repository with `credentials` in a private
    /// repository config; `None` for local charts and anonymous repositories
    async fn authorize_repo(
        &self,
        release: &ReleaseDescriptor,
        credentials: Option<&RepoCredentials>,
    ) -> Result<Option<AuthorizedRepo>, HelmError> {
        let Some(credentials) = credentials else {
            return Ok(None);
        };
        if !release.chart.path.is_empty() || release.repository.uri.is_empty() {
            return Ok(None);
        }

        let alias = if release.repository.name.is_empty() {
            DEFAULT_REPO_ALIAS.to_string()
        } else {
            release.repository.name.clone()
        };
        let repo = AuthorizedRepo {
            alias,
            config: NamedTempFile::new()?,
            cache: TempDir::new()?,
        };
        let args = Self::repo_add_args(
            &repo.alias,
            &release.repository.uri,
            &credentials.username,
            repo.config.path(),
            repo.cache.path(),
        );
        debug!(repo = %repo.alias, "Registering authenticated chart repository");
        self.run_with_stdin("repo-add", &args, Some(&credentials.password))
            .await?;
        Ok(Some(repo))
    }

    /// Write each override document to its own temporary file
    fn write_overrides(overrides: &[String]) -> Result<Vec<NamedTempFile>, HelmError> {
        overrides
            .iter()
            .map(|document| {
                let mut file = NamedTempFile::new()?;
                file.write_all(document.as_bytes())?;
                file.flush()?;
                Ok(file)
            })
            .collect()
    }
}

fn is_not_found(error: &HelmError) -> bool {
    matches!(error, HelmError::CommandFailed { stderr, .. } if stderr.contains("not found"))
}

#[async_trait]
impl HelmEngine for HelmCli {
    async fn upgrade_or_install(&self, options: &ReleaseOptions) -> Result<ReleaseInfo, HelmError> {
        let release = &options.release;
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            release.name.clone(),
        ];
        // The repository config must outlive the helm invocation
        let repo = self
            .authorize_repo(release, options.credentials.as_ref())
            .await?;
        args.extend(Self::chart_args(release, repo.as_ref()));
        args.extend([
            "--namespace".to_string(),
            release.namespace.clone(),
            "--create-namespace".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ]);

        // Files must outlive the helm invocation
        let files = Self::write_overrides(&options.overrides)?;
        for file in &files {
            args.push("-f".to_string());
            args.push(file.path().to_string_lossy().into_owned());
        }
        if options.wait {
            args.push("--wait".to_string());
        }
        if options.dry_run {
            args.push("--dry-run".to_string());
        }

        info!(
            release = %release.name,
            namespace = %release.namespace,
            version = %release.chart.version,
            "Running helm upgrade --install"
        );
        let stdout = self.run("upgrade", &args).await.inspect_err(|e| {
            error!(release = %release.name, "Helm upgrade --install failed: {}", e);
        })?;
        drop(files);
        drop(repo);

        let parsed: ReleaseJson =
            serde_json::from_str(&stdout).map_err(|e| HelmError::Parse(e.to_string()))?;
        Ok(ReleaseInfo {
            name: parsed.name,
            namespace: if parsed.namespace.is_empty() {
                release.namespace.clone()
            } else {
                parsed.namespace
            },
            status: parsed
                .info
                .map_or(ReleaseStatus::Unknown, |i| ReleaseStatus::parse(&i.status)),
            chart_version: parsed
                .chart
                .and_then(|c| c.metadata)
                .map_or_else(|| release.chart.version.clone(), |m| m.version),
        })
    }

    async fn uninstall(&self, name: &str, namespace: &str, dry_run: bool) -> Result<(), HelmError> {
        let mut args = vec![
            "uninstall".to_string(),
            name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        if dry_run {
            args.push("--dry-run".to_string());
        }

        info!(release = %name, namespace = %namespace, "Running helm uninstall");
        match self.run("uninstall", &args).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(release = %name, "Release already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn release_info(&self, name: &str, namespace: &str) -> Result<Option<ReleaseInfo>, HelmError> {
        let args = [
            "get", "metadata", name, "--namespace", namespace, "--output", "json",
        ]
        .map(String::from);
        let stdout = match self.run("get-metadata", &args).await {
            Ok(stdout) => stdout,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e),
        };

        let metadata: MetadataJson =
            serde_json::from_str(&stdout).map_err(|e| HelmError::Parse(e.to_string()))?;
        Ok(Some(ReleaseInfo {
            name: metadata.name,
            namespace: if metadata.namespace.is_empty() {
                namespace.to_string()
            } else {
                metadata.namespace
            },
            status: ReleaseStatus::parse(&metadata.status),
            chart_version: metadata.version,
        }))
    }

    async fn values(&self, name: &str, namespace: &str) -> Result<serde_json::Value, HelmError> {
        let args = [
            "get", "values", name, "--namespace", namespace, "--output", "json",
        ]
        .map(String::from);
        let stdout = self.run("get-values", &args).await?;
        let values: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|e| HelmError::Parse(e.to_string()))?;
        if values.is_null() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        Ok(values)
    }

    async fn manifest(&self, name: &str, namespace: &str) -> Result<String, HelmError> {
        let args = ["get", "manifest", name, "--namespace", namespace].map(String::from);
        self.run("get-manifest", &args).await
    }

    async fn chart_version(
        &self,
        release: &ReleaseDescriptor,
        credentials: Option<&RepoCredentials>,
    ) -> Result<String, HelmError> {
        let repo = self.authorize_repo(release, credentials).await?;
        let mut args = vec!["show".to_string(), "chart".to_string()];
        args.extend(Self::chart_args(release, repo.as_ref()));
        let stdout = self.run("show-chart", &args).await?;
        let chart: ChartYaml =
            serde_yaml::from_str(&stdout).map_err(|e| HelmError::Parse(e.to_string()))?;
        Ok(chart.version)
    }
}
