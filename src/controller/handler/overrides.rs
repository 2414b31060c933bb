//! # Value Overrides
//!
//! Resolves the value sources listed on a resource into value documents, in
//! list order. Each entry is resolved inline values first, then the secret
//! key, then the config map key. Missing optional sources are skipped.

use crate::cluster::{ClusterError, ClusterReader};
use crate::constants;
use crate::crd::{HelmRepo, KeySelector, ValuesSource};
use crate::helm::RepoCredentials;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("{kind} {namespace}/{name} has no key {key}")]
    MissingSource {
        kind: &'static str,
        namespace: String,
        name: String,
        key: String,
    },
    #[error("Invalid values in {origin}: {reason}")]
    InvalidValues { origin: String, reason: String },
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Parse one YAML values document; an empty document yields `None`
fn parse_values(origin: &str, document: &str) -> Result<Option<Value>, OverrideError> {
    let value: Value = serde_yaml::from_str(document).map_err(|e| OverrideError::InvalidValues {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Null => Ok(None),
        Value::Object(_) => Ok(Some(value)),
        other => Err(OverrideError::InvalidValues {
            origin: origin.to_string(),
            reason: format!("expected a map of values, found {other}"),
        }),
    }
}

async fn resolve_key(
    cluster: &dyn ClusterReader,
    kind: &'static str,
    namespace: &str,
    selector: &KeySelector,
) -> Result<Option<Value>, OverrideError> {
    let value = match kind {
        "Secret" => {
            cluster
                .secret_value(namespace, &selector.name, &selector.key)
                .await?
        }
        _ => {
            cluster
                .config_map_value(namespace, &selector.name, &selector.key)
                .await?
        }
    };

    match value {
        Some(document) => parse_values(
            &format!("{kind} {namespace}/{}[{}]", selector.name, selector.key),
            &document,
        ),
        None if selector.is_optional() => {
            debug!(
                "Skipping optional {} {}/{} key {}",
                kind, namespace, selector.name, selector.key
            );
            Ok(None)
        }
        None => Err(OverrideError::MissingSource {
            kind,
            namespace: namespace.to_string(),
            name: selector.name.clone(),
            key: selector.key.clone(),
        }),
    }
}

/// Resolve every value source into a values document, keeping list order
///
/// # Errors
///
/// Fails when a non-optional source is missing, a document is not a map of
/// values, or the cluster cannot be read.
pub async fn resolve_overrides(
    cluster: &dyn ClusterReader,
    namespace: &str,
    sources: &[ValuesSource],
) -> Result<Vec<Value>, OverrideError> {
    let mut documents = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let resolved = if let Some(values) = &source.values {
            match values {
                Value::Null => None,
                Value::Object(_) => Some(values.clone()),
                other => {
                    return Err(OverrideError::InvalidValues {
                        origin: format!("overrides[{index}].values"),
                        reason: format!("expected a map of values, found {other}"),
                    })
                }
            }
        } else if let Some(selector) = &source.secret_ref {
            resolve_key(cluster, "Secret", namespace, selector).await?
        } else if let Some(selector) = &source.config_map_ref {
            resolve_key(cluster, "ConfigMap", namespace, selector).await?
        } else {
            None
        };
        documents.extend(resolved);
    }
    Ok(documents)
}

/// Render value documents as YAML for Helm
///
/// # Errors
///
/// Returns [`OverrideError::InvalidValues`] when a document cannot be rendered.
pub fn to_yaml_documents(documents: &[Value]) -> Result<Vec<String>, OverrideError> {
    documents
        .iter()
        .enumerate()
        .map(|(index, document)| {
            serde_yaml::to_string(document).map_err(|e| OverrideError::InvalidValues {
                origin: format!("document {index}"),
                reason: e.to_string(),
            })
        })
        .collect()
}

async fn required_secret_key(
    cluster: &dyn ClusterReader,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<String, OverrideError> {
    cluster
        .secret_value(namespace, name, key)
        .await?
        .ok_or_else(|| OverrideError::MissingSource {
            kind: "Secret",
            namespace: namespace.to_string(),
            name: name.to_string(),
            key: key.to_string(),
        })
}

/// Read repository credentials from the repository's credentials secret
///
/// # Errors
///
/// Fails when the secret or one of its keys is missing.
pub async fn resolve_credentials(
    cluster: &dyn ClusterReader,
    namespace: &str,
    repo: &HelmRepo,
) -> Result<Option<RepoCredentials>, OverrideError> {
    let Some(secret) = repo.credentials_secret.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let username = required_secret_key(cluster, namespace, secret, constants::REPO_USERNAME_KEY).await?;
    let password = required_secret_key(cluster, namespace, secret, constants::REPO_PASSWORD_KEY).await?;
    Ok(Some(RepoCredentials { username, password }))
}
