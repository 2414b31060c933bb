//! # Class Predicates
//!
//! Each controller instance handles one module class. Events for resources of
//! any other class are dropped before they reach the dispatcher.

use crate::crd::LifecycleResource;

/// Whether the resource is tagged with `class`
#[must_use]
pub fn class_matches<K: LifecycleResource>(resource: &K, class: &str) -> bool {
    resource.class_name() == class
}
