//! # Helm Types
//!
//! Helm release, chart, repository and value-source types embedded in the
//! Module and ModuleAction specs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Helm chart reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmChart {
    /// Chart name
    pub name: String,
    /// Chart version; empty means the version the chart itself declares
    #[serde(default)]
    pub version: String,
    /// Local chart directory; when empty the chart is pulled from the repository
    #[serde(default)]
    pub path: String,
}

/// Helm repository reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepo {
    /// Repository name
    #[serde(default)]
    pub name: String,
    /// Repository URI
    #[serde(default)]
    pub uri: String,
    /// Secret (in the resource namespace) carrying `username` and `password`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<String>,
}

/// Helm release requested by a ModuleAction installer
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    /// Release name
    pub name: String,
    /// Release namespace
    #[serde(default)]
    pub namespace: String,
    /// Chart to deploy
    pub chart: HelmChart,
    /// Repository the chart is pulled from
    #[serde(default)]
    pub repo: HelmRepo,
    /// Value overrides, later entries win
    #[serde(default)]
    pub overrides: Vec<ValuesSource>,
}

/// Reference to one key of a config map or secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeySelector {
    /// Name of the config map or secret
    pub name: String,
    /// Key holding a YAML document
    pub key: String,
    /// A missing optional source is skipped instead of failing the reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

impl KeySelector {
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }
}

/// One Helm value override
///
/// Exactly one field is expected; when several are set the inline values take
/// precedence, then the secret reference, then the config map reference.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValuesSource {
    /// Config map key carrying YAML values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<KeySelector>,
    /// Secret key carrying YAML values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<KeySelector>,
    /// Inline values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub values: Option<serde_json::Value>,
}

impl ValuesSource {
    /// Inline values override
    #[must_use]
    pub fn inline(values: serde_json::Value) -> Self {
        Self {
            values: Some(values),
            ..Self::default()
        }
    }

    /// Secret key override
    #[must_use]
    pub fn secret(name: &str, key: &str, optional: bool) -> Self {
        Self {
            secret_ref: Some(KeySelector {
                name: name.to_string(),
                key: key.to_string(),
                optional: Some(optional),
            }),
            ..Self::default()
        }
    }

    /// Config map key override
    #[must_use]
    pub fn config_map(name: &str, key: &str, optional: bool) -> Self {
        Self {
            config_map_ref: Some(KeySelector {
                name: name.to_string(),
                key: key.to_string(),
                optional: Some(optional),
            }),
            ..Self::default()
        }
    }
}

/// Schema for free-form values: any object, kept as-is by the API server
fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
