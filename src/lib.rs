//! # Module Operator
//!
//! A Kubernetes operator that drives the lifecycle of Helm-backed `Module` and
//! `ModuleAction` resources.
//!
//! Each resource generation walks a fixed state machine (pre-work, work, wait,
//! post-work, complete) under one of four lifecycle actions: install, update,
//! upgrade or uninstall. Progress is recorded as `Ready` conditions and a
//! coarse state on the resource status.
//!
//! ## Layout
//!
//! - `crd` - the two custom resources and their status model
//! - `controller` - dispatcher, state machine, handlers and supporting pieces
//! - `helm` - the Helm engine trait, its CLI implementation and value merging
//! - `cluster` - Kubernetes access for resources, value sources and workloads
//! - `config` - environment-driven configuration
//! - `runtime` - startup, watch loop and error policy
//! - `observability` - Prometheus metrics

pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod helm;
pub mod observability;
pub mod runtime;

#[cfg(test)]
mod testing;
