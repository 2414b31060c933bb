//! # Class Hooks
//!
//! Module classes specialise the generic Helm lifecycle through [`ClassHooks`].
//! The registry maps a class name to its hooks; classes without a registration
//! get the no-op [`HelmClassHooks`].

use crate::constants;
use crate::controller::result::ReconcileResult;
use crate::controller::selection::LifecycleAction;
use crate::helm::ReleaseDescriptor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Class-specific hook points around the lifecycle work
#[async_trait]
pub trait ClassHooks: Send + Sync {
    fn class_name(&self) -> &str;

    /// Values placed underneath the resource's own overrides
    fn base_values(&self, _release: &ReleaseDescriptor) -> Option<serde_json::Value> {
        None
    }

    /// Runs at the end of the handler's pre-work step
    async fn pre_work(&self, _action: LifecycleAction, _release: &ReleaseDescriptor) -> ReconcileResult {
        ReconcileResult::new()
    }

    /// Runs in the handler's post-work step
    async fn post_work(&self, _action: LifecycleAction, _release: &ReleaseDescriptor) -> ReconcileResult {
        ReconcileResult::new()
    }
}

/// Generic Helm class: plain chart, no extra behaviour
#[derive(Debug, Clone)]
pub struct HelmClassHooks {
    class: String,
}

impl HelmClassHooks {
    #[must_use]
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
        }
    }
}

impl Default for HelmClassHooks {
    fn default() -> Self {
        Self::new(constants::DEFAULT_MODULE_CLASS)
    }
}

#[async_trait]
impl ClassHooks for HelmClassHooks {
    fn class_name(&self) -> &str {
        &self.class
    }
}

/// Hooks registered per module class
#[derive(Clone, Default)]
pub struct ClassRegistry {
    hooks: HashMap<String, Arc<dyn ClassHooks>>,
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<&String> = self.hooks.keys().collect();
        classes.sort();
        f.debug_struct("ClassRegistry")
            .field("classes", &classes)
            .finish()
    }
}

impl ClassRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the generic Helm class registered
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HelmClassHooks::default()));
        registry
    }

    /// Register hooks under their class name, replacing any earlier registration
    pub fn register(&mut self, hooks: Arc<dyn ClassHooks>) {
        self.hooks.insert(hooks.class_name().to_string(), hooks);
    }

    /// Hooks for a class, falling back to the generic Helm hooks
    #[must_use]
    pub fn hooks_for(&self, class: &str) -> Arc<dyn ClassHooks> {
        self.hooks
            .get(class)
            .map_or_else(|| Arc::new(HelmClassHooks::new(class)) as Arc<dyn ClassHooks>, Arc::clone)
    }

    #[must_use]
    pub fn is_registered(&self, class: &str) -> bool {
        self.hooks.contains_key(class)
    }
}
